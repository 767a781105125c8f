use serde_json::Value;

use crate::config::Config;
use crate::endpoints::{build, Endpoint};
use crate::error::{Error, Result};
use crate::extract::{
    extract_fuel_mix, extract_lmp_latest, extract_lmp_series, extract_load_series,
    FuelMixObservation, ObservationSeries, PriceResult,
};
use crate::fetch::{fetch_all, HttpTransport, Transport};
use crate::options::{resolve, DataKind, Hints, Mode, RequestOptions, Window};
use crate::time::{Clock, SystemClock};

/// Stateless client: each call resolves, builds endpoints, fetches and extracts.
pub struct IsoNeClient<T = HttpTransport, C = SystemClock> {
    config: Config,
    transport: T,
    clock: C,
}

impl IsoNeClient {
    pub fn new(config: Config) -> Result<Self> {
        let transport = HttpTransport::new(config.base_url.clone())?;
        Ok(Self::with_parts(config, transport, SystemClock))
    }
}

impl<T: Transport, C: Clock> IsoNeClient<T, C> {
    pub fn with_parts(config: Config, transport: T, clock: C) -> Self {
        Self {
            config,
            transport,
            clock,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Forecast mode with the configured horizon.
    pub fn forecast(&self) -> Mode {
        Mode::Forecast {
            horizon_days: self.config.forecast_days,
        }
    }

    pub fn request_endpoints(&self, options: &RequestOptions) -> Vec<Endpoint> {
        build(options, &self.clock, self.config.market_tz)
    }

    async fn documents(&self, options: &RequestOptions) -> Result<Vec<Value>> {
        let endpoints = self.request_endpoints(options);
        let fetched = fetch_all(
            &self.transport,
            &endpoints,
            &self.config.credentials,
            self.config.fetch_settings(),
        )
        .await?;
        Ok(fetched.into_iter().map(|(_, document)| document).collect())
    }

    /// System load in MW. Historical series are clipped to the requested range.
    pub async fn get_load(&self, mode: Mode, hints: Hints) -> Result<ObservationSeries> {
        let options = resolve(DataKind::Load, mode, hints)?;
        let series = extract_load_series(&self.documents(&options).await?)?;
        tracing::info!("Extracted {} load observations", series.len());

        Ok(match options.window() {
            Window::Historical { start_at, end_at } => series.clip(start_at, end_at),
            _ => series,
        })
    }

    /// Generation by fuel. Historical results are clipped to the requested range.
    pub async fn get_generation(&self, mode: Mode, hints: Hints) -> Result<Vec<FuelMixObservation>> {
        let options = resolve(DataKind::Generation, mode, hints)?;
        let mut mix = extract_fuel_mix(&self.documents(&options).await?)?;
        if let Window::Historical { start_at, end_at } = options.window() {
            mix.retain(|o| o.timestamp >= start_at && o.timestamp <= end_at);
        }
        tracing::info!("Extracted {} fuel mix observations", mix.len());
        Ok(mix)
    }

    /// LMP at `node`: a scalar for latest requests, otherwise a time-indexed map.
    pub async fn get_lmp(&self, node: &str, mode: Mode, hints: Hints) -> Result<PriceResult> {
        let options = resolve(DataKind::Price, mode, hints.node(node))?;
        let documents = self.documents(&options).await?;

        match options.window() {
            Window::Latest => {
                let document = documents
                    .first()
                    .ok_or_else(|| Error::MalformedDocument("no document returned".into()))?;
                extract_lmp_latest(document, node).map(PriceResult::Latest)
            }
            Window::Forecast { .. } => extract_lmp_series(&documents, node).map(PriceResult::Series),
            Window::Historical { start_at, end_at } => {
                let series = extract_lmp_series(&documents, node)?;
                Ok(PriceResult::Series(series.clip(start_at, end_at)))
            }
        }
    }
}
