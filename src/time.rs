use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// Converts an ISO-8601 timestamp with an explicit UTC offset into a UTC instant.
///
/// Accepts `-04:00`, `-0400` and `Z` offsets, with or without fractional seconds.
/// Timestamps without an offset are rejected rather than guessed.
pub fn utcify(timestamp: &str) -> Result<DateTime<Utc>> {
    let trimmed = timestamp.trim();
    DateTime::parse_from_rfc3339(trimmed)
        .or_else(|_| DateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|dt| dt.to_utc())
        .map_err(|_| Error::UnparseableTimestamp(timestamp.to_string()))
}

/// Source of the current instant. Latest and forecast endpoints depend on it.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    #[test]
    fn utcify_resolves_negative_offset() {
        let ts = utcify("2014-05-03T02:32:44.000-04:00").unwrap();
        assert_eq!(ts.year(), 2014);
        assert_eq!(ts.month(), 5);
        assert_eq!(ts.day(), 3);
        assert_eq!(ts.hour(), 6);
        assert_eq!(ts.minute(), 32);
        assert_eq!(ts.second(), 44);
        assert_eq!(ts, Utc.with_ymd_and_hms(2014, 5, 3, 6, 32, 44).unwrap());
    }

    #[test]
    fn utcify_crosses_midnight() {
        let ts = utcify("2015-06-10T23:55:00-04:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2015, 6, 11, 3, 55, 0).unwrap());
    }

    #[test]
    fn utcify_accepts_compact_offset_and_zulu() {
        let compact = utcify("2015-01-01T01:05:00.000-0500").unwrap();
        assert_eq!(compact, Utc.with_ymd_and_hms(2015, 1, 1, 6, 5, 0).unwrap());

        let zulu = utcify("2015-01-01T06:05:00Z").unwrap();
        assert_eq!(zulu, compact);
    }

    #[test]
    fn utcify_rejects_garbage_and_naive() {
        assert!(matches!(
            utcify("not a timestamp"),
            Err(Error::UnparseableTimestamp(_))
        ));
        assert!(matches!(
            utcify("2014-05-03T02:32:44"),
            Err(Error::UnparseableTimestamp(_))
        ));
    }

    #[test]
    fn fixed_clock_is_fixed() {
        let at = Utc.with_ymd_and_hms(2020, 2, 29, 12, 0, 0).unwrap();
        let clock = FixedClock(at);
        assert_eq!(clock.now(), at);
        assert_eq!(clock.now(), clock.now());
    }
}
