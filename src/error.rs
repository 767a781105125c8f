use crate::endpoints::Endpoint;
use crate::options::{DataKind, Frequency, Market, ModeKind};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No resource serves {kind} {mode} data (market {market:?}, frequency {frequency:?})")]
    InvalidCombination {
        kind: DataKind,
        mode: ModeKind,
        market: Option<Market>,
        frequency: Option<Frequency>,
    },

    #[error("Historical requests need both start_at and end_at")]
    MissingRange,

    #[error("Invalid range: end_at {end_at} is not after start_at {start_at}")]
    InvalidRange {
        start_at: chrono::DateTime<chrono::Utc>,
        end_at: chrono::DateTime<chrono::Utc>,
    },

    #[error("Forecast horizon must be at least one day")]
    InvalidHorizon,

    #[error("Unparseable timestamp: {0}")]
    UnparseableTimestamp(String),

    #[error("Fetch of {endpoint} failed")]
    FetchFailed {
        endpoint: Endpoint,
        #[source]
        source: anyhow::Error,
    },

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_failed_names_endpoint_and_cause() {
        let err = Error::FetchFailed {
            endpoint: Endpoint::new("/genfuelmix/current.json"),
            source: anyhow::anyhow!("connection reset"),
        };
        assert_eq!(err.to_string(), "Fetch of /genfuelmix/current.json failed");

        let cause = std::error::Error::source(&err).map(|e| e.to_string());
        assert_eq!(cause.as_deref(), Some("connection reset"));
    }

    #[test]
    fn invalid_combination_display() {
        let err = Error::InvalidCombination {
            kind: DataKind::Generation,
            mode: ModeKind::Forecast,
            market: None,
            frequency: None,
        };
        assert!(err.to_string().starts_with("No resource serves generation forecast data"));
    }
}
