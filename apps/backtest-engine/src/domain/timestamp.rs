//! Timestamp value object for simulated market time.
//!
//! Tick data carries sub-second precision, daily bars are date-only and
//! are represented at midnight. Both share one totally ordered type so the
//! merge scheduler can compare observations from any stream.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Datetime layouts accepted for price rows, tried in order.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y%m%d %H:%M:%S%.f",
    "%d.%m.%Y %H:%M:%S%.f",
];

/// Date-only layouts accepted for bar rows.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d"];

/// Failed to interpret a textual timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised timestamp '{0}'")]
pub struct TimestampError(pub String);

/// A point in simulated market time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    /// Create a new Timestamp from a naive datetime.
    #[must_use]
    pub const fn new(dt: NaiveDateTime) -> Self {
        Self(dt)
    }

    /// Midnight of the given date.
    #[must_use]
    pub const fn from_date(date: NaiveDate) -> Self {
        Self(NaiveDateTime::new(date, NaiveTime::MIN))
    }

    /// Parse a timestamp from any of the supported textual layouts.
    ///
    /// RFC 3339 values are converted to UTC before the offset is dropped.
    pub fn parse(s: &str) -> Result<Self, TimestampError> {
        let s = s.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self(dt.naive_utc()));
        }

        for format in DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
                return Ok(Self(dt));
            }
        }

        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(s, format) {
                return Ok(Self::from_date(date));
            }
        }

        Err(TimestampError(s.to_string()))
    }

    /// Get the inner naive datetime.
    #[must_use]
    pub const fn as_datetime(&self) -> NaiveDateTime {
        self.0
    }

    /// Calendar date of this timestamp.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.0.date()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.time() == NaiveTime::MIN {
            write!(f, "{}", self.0.format("%Y-%m-%d"))
        } else {
            // %.f prints 0, 3, 6 or 9 digits, whichever keeps full precision
            write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S%.f"))
        }
    }
}

impl From<NaiveDateTime> for Timestamp {
    fn from(dt: NaiveDateTime) -> Self {
        Self(dt)
    }
}

impl std::str::FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("2016-01-05" ; "date only")]
    #[test_case("20160105" ; "compact date")]
    #[test_case("2016-01-05 00:00:00" ; "space separated")]
    #[test_case("2016-01-05T00:00:00" ; "iso without offset")]
    #[test_case("2016-01-05T00:00:00Z" ; "rfc3339 utc")]
    #[test_case("20160105 00:00:00.000" ; "compact tick")]
    #[test_case("05.01.2016 00:00:00.000" ; "day first tick")]
    fn test_parse_layouts_agree(input: &str) {
        let expected = Timestamp::from_date(NaiveDate::from_ymd_opt(2016, 1, 5).unwrap());
        assert_eq!(Timestamp::parse(input).unwrap(), expected);
    }

    #[test]
    fn test_parse_keeps_milliseconds() {
        let a = Timestamp::parse("20160105 10:00:00.100").unwrap();
        let b = Timestamp::parse("20160105 10:00:00.250").unwrap();
        assert!(a < b);
        assert_eq!(b.to_string(), "2016-01-05 10:00:00.250");
    }

    #[test_case("20160105 10:00:00", "2016-01-05 10:00:00" ; "whole seconds")]
    #[test_case("20160105 10:00:00.250", "2016-01-05 10:00:00.250" ; "milliseconds")]
    #[test_case("20160105 10:00:00.000125", "2016-01-05 10:00:00.000125" ; "microseconds")]
    #[test_case("2016-01-05 10:00:00.123456789", "2016-01-05 10:00:00.123456789" ; "nanoseconds")]
    fn test_display_keeps_sub_second_precision(input: &str, expected: &str) {
        assert_eq!(Timestamp::parse(input).unwrap().to_string(), expected);
    }

    #[test]
    fn test_rfc3339_converted_to_utc() {
        let ts = Timestamp::parse("2024-01-02T10:30:00+01:00").unwrap();
        assert_eq!(ts, Timestamp::parse("2024-01-02 09:30:00").unwrap());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = Timestamp::parse("not-a-date").unwrap_err();
        assert_eq!(err.to_string(), "unrecognised timestamp 'not-a-date'");
    }

    #[test]
    fn test_display_date_only_for_midnight() {
        let ts = Timestamp::parse("2024-03-01").unwrap();
        assert_eq!(ts.to_string(), "2024-03-01");
    }
}
