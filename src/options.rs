use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::endpoints::Resource;
use crate::error::{Error, Result};

/// Number of days covered by a forecast request unless the caller says otherwise.
pub const DEFAULT_FORECAST_DAYS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Generation,
    Load,
    Price,
}

/// Settlement timeframe of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Market {
    NotApplicable,
    RealTime,
    FiveMinute,
    DayAhead,
}

/// Sampling interval of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frequency {
    NotApplicable,
    FiveMinute,
    Hourly,
}

impl Frequency {
    /// Grid spacing in minutes, if the frequency has one.
    pub fn minutes(&self) -> Option<u32> {
        match self {
            Frequency::NotApplicable => None,
            Frequency::FiveMinute => Some(5),
            Frequency::Hourly => Some(60),
        }
    }
}

/// What time span the caller is asking about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Latest,
    Forecast {
        horizon_days: u32,
    },
    Historical {
        start_at: Option<DateTime<Utc>>,
        end_at: Option<DateTime<Utc>>,
    },
}

impl Mode {
    pub fn forecast() -> Self {
        Mode::Forecast {
            horizon_days: DEFAULT_FORECAST_DAYS,
        }
    }

    pub fn historical(start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Self {
        Mode::Historical {
            start_at: Some(start_at),
            end_at: Some(end_at),
        }
    }

    pub fn kind(&self) -> ModeKind {
        match self {
            Mode::Latest => ModeKind::Latest,
            Mode::Forecast { .. } => ModeKind::Forecast,
            Mode::Historical { .. } => ModeKind::Historical,
        }
    }

    fn validate(self) -> Result<Window> {
        match self {
            Mode::Latest => Ok(Window::Latest),
            Mode::Forecast { horizon_days: 0 } => Err(Error::InvalidHorizon),
            Mode::Forecast { horizon_days } => Ok(Window::Forecast { horizon_days }),
            Mode::Historical {
                start_at: Some(start_at),
                end_at: Some(end_at),
            } => {
                if end_at <= start_at {
                    return Err(Error::InvalidRange { start_at, end_at });
                }
                Ok(Window::Historical { start_at, end_at })
            }
            Mode::Historical { .. } => Err(Error::MissingRange),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeKind {
    Latest,
    Forecast,
    Historical,
}

/// A validated time span. Only [`resolve`] produces one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Latest,
    Forecast {
        horizon_days: u32,
    },
    Historical {
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    },
}

impl Window {
    pub fn kind(&self) -> ModeKind {
        match self {
            Window::Latest => ModeKind::Latest,
            Window::Forecast { .. } => ModeKind::Forecast,
            Window::Historical { .. } => ModeKind::Historical,
        }
    }
}

/// Optional caller overrides applied on top of the defaulting table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hints {
    pub market: Option<Market>,
    pub frequency: Option<Frequency>,
    pub node: Option<String>,
}

impl Hints {
    pub fn market(mut self, market: Market) -> Self {
        self.market = Some(market);
        self
    }

    pub fn frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = Some(frequency);
        self
    }

    pub fn node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }
}

/// A fully resolved request. Market and frequency are consistent with the
/// data kind and mode, and map to exactly one API resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    data_kind: DataKind,
    market: Market,
    frequency: Frequency,
    window: Window,
    node: Option<String>,
    resource: Resource,
}

impl RequestOptions {
    pub fn data_kind(&self) -> DataKind {
        self.data_kind
    }

    pub fn market(&self) -> Market {
        self.market
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    pub fn start_at(&self) -> Option<DateTime<Utc>> {
        match self.window {
            Window::Historical { start_at, .. } => Some(start_at),
            _ => None,
        }
    }

    pub fn end_at(&self) -> Option<DateTime<Utc>> {
        match self.window {
            Window::Historical { end_at, .. } => Some(end_at),
            _ => None,
        }
    }
}

/// Market and frequency used when the caller gives no override.
pub fn default_market_frequency(kind: DataKind, mode: ModeKind) -> Option<(Market, Frequency)> {
    use DataKind::*;
    use ModeKind::*;

    match (kind, mode) {
        (Generation, Latest) => Some((Market::NotApplicable, Frequency::NotApplicable)),
        (Load, Latest) => Some((Market::FiveMinute, Frequency::FiveMinute)),
        (Load, Forecast) => Some((Market::DayAhead, Frequency::Hourly)),
        (Load, Historical) => Some((Market::FiveMinute, Frequency::FiveMinute)),
        (Price, Latest) => Some((Market::RealTime, Frequency::NotApplicable)),
        (Price, Historical) => Some((Market::RealTime, Frequency::FiveMinute)),
        (Generation, Forecast) | (Generation, Historical) | (Price, Forecast) => None,
    }
}

/// Validates a request and fills in its market and frequency.
///
/// Explicit overrides in `hints` win over the defaulting table. A pair with no
/// table row is only accepted when the caller names the market. Whatever the
/// outcome, the combination must be served by an API resource that supports
/// the requested mode.
pub fn resolve(data_kind: DataKind, mode: Mode, hints: Hints) -> Result<RequestOptions> {
    let window = mode.validate()?;
    let mode_kind = window.kind();

    let invalid = || Error::InvalidCombination {
        kind: data_kind,
        mode: mode_kind,
        market: hints.market,
        frequency: hints.frequency,
    };

    let defaults = default_market_frequency(data_kind, mode_kind);
    let market = hints
        .market
        .or(defaults.map(|(market, _)| market))
        .ok_or_else(invalid)?;
    let resource = Resource::select(data_kind, market).ok_or_else(invalid)?;

    // The table's frequency only applies when the table's market is in effect.
    let table_frequency = defaults
        .filter(|(default_market, _)| *default_market == market)
        .map(|(_, frequency)| frequency);
    let frequency = hints
        .frequency
        .or(table_frequency)
        .unwrap_or_else(|| resource.native_frequency());

    if !resource.accepts_frequency(frequency) || !resource.supports(mode_kind) {
        return Err(invalid());
    }

    tracing::debug!(
        "Resolved {data_kind} {mode_kind} to {market:?}/{frequency:?} via {}",
        resource.stem()
    );

    Ok(RequestOptions {
        data_kind,
        market,
        frequency,
        window,
        node: hints.node,
        resource,
    })
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataKind::Generation => "generation",
            DataKind::Load => "load",
            DataKind::Price => "price",
        })
    }
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModeKind::Latest => "latest",
            ModeKind::Forecast => "forecast",
            ModeKind::Historical => "historical",
        })
    }
}

impl FromStr for Market {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "na" | "n/a" => Ok(Market::NotApplicable),
            "rt" | "rtm" | "real-time" | "realtime" => Ok(Market::RealTime),
            "5m" | "rt5m" | "five-minute" | "fivemin" => Ok(Market::FiveMinute),
            "da" | "dam" | "day-ahead" | "dayahead" => Ok(Market::DayAhead),
            _ => Err(Error::Config(format!("Invalid market: {s}"))),
        }
    }
}

impl FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "na" | "n/a" => Ok(Frequency::NotApplicable),
            "5m" | "five-minute" | "fivemin" => Ok(Frequency::FiveMinute),
            "1hr" | "hourly" | "hour" => Ok(Frequency::Hourly),
            _ => Err(Error::Config(format!("Invalid frequency: {s}"))),
        }
    }
}
