use std::time::Duration;

use chrono_tz::Tz;

use crate::error::{Error, Result};
use crate::fetch::{Credentials, FetchSettings, PartialPolicy, DEFAULT_BASE_URL, DEFAULT_MAX_IN_FLIGHT};
use crate::options::DEFAULT_FORECAST_DAYS;

#[derive(Clone, Debug)]
pub struct Config {
    pub credentials: Credentials,
    pub base_url: String,
    pub forecast_days: u32,
    pub fetch_timeout: Option<Duration>,
    pub market_tz: Tz,
    pub partial_policy: PartialPolicy,
    /// Most requests kept outstanding by one call; historical ranges fetch one document per day.
    pub max_in_flight: usize,
}

impl Config {
    /// Reads `ISONE_*` variables from the process environment. Call
    /// `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            var(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::Config(format!("{key} must be set")))
        };

        Ok(Config {
            credentials: Credentials::new(required("ISONE_USERNAME")?, required("ISONE_PASSWORD")?),
            base_url: var("ISONE_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            forecast_days: var("ISONE_FORECAST_DAYS")
                .unwrap_or_else(|| DEFAULT_FORECAST_DAYS.to_string())
                .parse()
                .map_err(|_| Error::Config("ISONE_FORECAST_DAYS must be a number".into()))?,
            fetch_timeout: var("ISONE_FETCH_TIMEOUT_SECS")
                .map(|secs| {
                    secs.parse()
                        .map(Duration::from_secs)
                        .map_err(|_| Error::Config("ISONE_FETCH_TIMEOUT_SECS must be a number".into()))
                })
                .transpose()?,
            market_tz: var("ISONE_MARKET_TZ")
                .unwrap_or_else(|| "America/New_York".to_string())
                .parse()
                .map_err(|e| Error::Config(format!("ISONE_MARKET_TZ: {e}")))?,
            partial_policy: PartialPolicy::Atomic,
            max_in_flight: match var("ISONE_MAX_IN_FLIGHT") {
                Some(n) => match n.parse() {
                    Ok(0) | Err(_) => {
                        return Err(Error::Config(
                            "ISONE_MAX_IN_FLIGHT must be a positive number".into(),
                        ))
                    }
                    Ok(n) => n,
                },
                None => DEFAULT_MAX_IN_FLIGHT,
            },
        })
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            policy: self.partial_policy,
            timeout: self.fetch_timeout,
            max_in_flight: self.max_in_flight,
        }
    }

    pub fn builder(credentials: Credentials) -> ConfigBuilder {
        ConfigBuilder {
            config: Config {
                credentials,
                base_url: DEFAULT_BASE_URL.to_string(),
                forecast_days: DEFAULT_FORECAST_DAYS,
                fetch_timeout: None,
                market_tz: chrono_tz::America::New_York,
                partial_policy: PartialPolicy::Atomic,
                max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            },
        }
    }
}

#[derive(Debug)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn forecast_days(mut self, days: u32) -> Self {
        self.config.forecast_days = days;
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch_timeout = Some(timeout);
        self
    }

    pub fn market_tz(mut self, tz: Tz) -> Self {
        self.config.market_tz = tz;
        self
    }

    pub fn partial_policy(mut self, policy: PartialPolicy) -> Self {
        self.config.partial_policy = policy;
        self
    }

    /// Values below one are raised to one.
    pub fn max_in_flight(mut self, n: usize) -> Self {
        self.config.max_in_flight = n.max(1);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_with_credentials() {
        let config =
            Config::from_lookup(lookup(&[("ISONE_USERNAME", "me"), ("ISONE_PASSWORD", "pw")]))
                .unwrap();
        assert_eq!(config.credentials.as_pair(), ("me", "pw"));
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.forecast_days, 3);
        assert_eq!(config.fetch_timeout, None);
        assert_eq!(config.market_tz, chrono_tz::America::New_York);
        assert_eq!(config.max_in_flight, DEFAULT_MAX_IN_FLIGHT);
    }

    #[test]
    fn missing_credentials() {
        let err = Config::from_lookup(lookup(&[("ISONE_USERNAME", "me")])).unwrap_err();
        assert!(err.to_string().contains("ISONE_PASSWORD"));
    }

    #[test]
    fn overrides_and_bad_values() {
        let config = Config::from_lookup(lookup(&[
            ("ISONE_USERNAME", "me"),
            ("ISONE_PASSWORD", "pw"),
            ("ISONE_FORECAST_DAYS", "2"),
            ("ISONE_FETCH_TIMEOUT_SECS", "30"),
            ("ISONE_MARKET_TZ", "UTC"),
            ("ISONE_MAX_IN_FLIGHT", "8"),
        ]))
        .unwrap();
        assert_eq!(config.forecast_days, 2);
        assert_eq!(config.fetch_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.market_tz, chrono_tz::UTC);
        assert_eq!(config.fetch_settings().max_in_flight, 8);

        assert!(Config::from_lookup(lookup(&[
            ("ISONE_USERNAME", "me"),
            ("ISONE_PASSWORD", "pw"),
            ("ISONE_FORECAST_DAYS", "three"),
        ]))
        .is_err());
    }

    #[test]
    fn in_flight_cap_must_be_positive() {
        for bad in ["0", "-2", "many"] {
            let err = Config::from_lookup(lookup(&[
                ("ISONE_USERNAME", "me"),
                ("ISONE_PASSWORD", "pw"),
                ("ISONE_MAX_IN_FLIGHT", bad),
            ]))
            .unwrap_err();
            assert!(err.to_string().contains("ISONE_MAX_IN_FLIGHT"), "{bad}");
        }

        let config = Config::builder(Credentials::new("me", "pw"))
            .max_in_flight(0)
            .partial_policy(PartialPolicy::BestEffort)
            .build();
        assert_eq!(
            config.fetch_settings(),
            FetchSettings {
                policy: PartialPolicy::BestEffort,
                timeout: None,
                max_in_flight: 1,
            }
        );
    }
}
