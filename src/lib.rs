//! Client for the ISO New England web services API: fuel mix, system load and LMPs.

pub mod client;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod options;
pub mod time;

pub use client::IsoNeClient;
pub use config::Config;
pub use endpoints::{build, Endpoint, Resource};
pub use error::{Error, Result};
pub use extract::{
    extract_fuel_mix, extract_lmp_latest, extract_lmp_series, extract_load_series, Fuel,
    FuelMixObservation, Observation, ObservationSeries, PriceResult, PriceSeries, QualityIssue,
};
pub use fetch::{
    fetch, fetch_all, Credentials, FetchSettings, HttpTransport, PartialPolicy, Transport,
    DEFAULT_MAX_IN_FLIGHT,
};
pub use options::{resolve, DataKind, Frequency, Hints, Market, Mode, RequestOptions, Window};
pub use time::{utcify, Clock, FixedClock, SystemClock};
