use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use isone::{Config, Frequency, Hints, IsoNeClient, Market, Mode, PartialPolicy, PriceResult};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "isone", about = "Query ISO New England load, fuel mix and LMP data")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Request the forecast horizon instead of the latest value
    #[arg(long, global = true, conflicts_with_all = ["start", "end"])]
    forecast: bool,

    /// Range start, RFC 3339 with offset
    #[arg(long, global = true, value_parser = parse_instant)]
    start: Option<DateTime<Utc>>,

    /// Range end, RFC 3339 with offset
    #[arg(long, global = true, value_parser = parse_instant)]
    end: Option<DateTime<Utc>>,

    #[arg(long, global = true)]
    market: Option<Market>,

    #[arg(long, global = true)]
    frequency: Option<Frequency>,

    /// Skip days that fail to download instead of failing the request
    #[arg(long, global = true)]
    best_effort: bool,
}

#[derive(Subcommand)]
enum Command {
    /// System load in MW
    Load,
    /// Generation by fuel category
    Generation,
    /// Locational marginal price at a node, e.g. NEMASSBOST
    Lmp { node: String },
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, isone::Error> {
    isone::utcify(s)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("Failed to load ISO-NE configuration")?;
    if cli.best_effort {
        config.partial_policy = PartialPolicy::BestEffort;
    }
    let client = IsoNeClient::new(config)?;

    let mode = if cli.forecast {
        client.forecast()
    } else if cli.start.is_some() || cli.end.is_some() {
        Mode::Historical {
            start_at: cli.start,
            end_at: cli.end,
        }
    } else {
        Mode::Latest
    };

    let hints = Hints {
        market: cli.market,
        frequency: cli.frequency,
        node: None,
    };

    match cli.command {
        Command::Load => {
            let series = client.get_load(mode, hints).await?;
            for obs in series.iter() {
                println!("{}\t{:.1}", obs.timestamp.to_rfc3339(), obs.value);
            }
            if !series.issues().is_empty() {
                info!("{} data quality issue(s) reported", series.issues().len());
            }
        }
        Command::Generation => {
            for obs in client.get_generation(mode, hints).await? {
                println!(
                    "{}\t{:?}\t{:.1}{}",
                    obs.timestamp.to_rfc3339(),
                    obs.fuel,
                    obs.gen_mw,
                    if obs.marginal { "\tmarginal" } else { "" }
                );
            }
        }
        Command::Lmp { node } => match client.get_lmp(&node, mode, hints).await? {
            PriceResult::Latest(price) => println!("{node}\t{price:.2}"),
            PriceResult::Series(series) => {
                for (timestamp, price) in series.iter() {
                    println!("{}\t{price:.2}", timestamp.to_rfc3339());
                }
                if !series.issues().is_empty() {
                    info!("{} data quality issue(s) reported", series.issues().len());
                }
            }
        },
    }

    Ok(())
}
