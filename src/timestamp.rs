//! # Timestamp Normalization
//!
//! The engine takes time as integer Unix epoch seconds. Callers hold time in
//! whatever shape is handy, so [`Timestamp`] is a closed set of accepted
//! inputs with one normalization rule each:
//!
//! | variant | rule |
//! |---|---|
//! | `Iso` | RFC 3339 (`2024-06-24T16:30:00Z`, `+02:00`); naive date-times and bare dates are UTC |
//! | `DateTime` | `timestamp()` |
//! | `Epoch` | as-is |
//! | `EpochFloat` | truncated toward zero |

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimestampError {
    #[error("unrecognized ISO-8601 timestamp {0:?}")]
    Iso(String),

    #[error("epoch seconds must be finite, got {0}")]
    NonFinite(f64),
}

/// A point in time as supplied by a caller.
#[derive(Clone, Debug, PartialEq)]
pub enum Timestamp {
    Iso(String),
    DateTime(DateTime<Utc>),
    Epoch(i64),
    EpochFloat(f64),
}

const NAIVE_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%MZ",
    "%Y-%m-%d %H:%MZ",
];

impl Timestamp {
    /// Integer epoch seconds.
    pub fn normalize(&self) -> Result<i64, TimestampError> {
        match self {
            Timestamp::Iso(text) => parse_iso(text),
            Timestamp::DateTime(dt) => Ok(dt.timestamp()),
            Timestamp::Epoch(secs) => Ok(*secs),
            Timestamp::EpochFloat(secs) if secs.is_finite() => Ok(secs.trunc() as i64),
            Timestamp::EpochFloat(secs) => Err(TimestampError::NonFinite(*secs)),
        }
    }

    /// Current time.
    pub fn now() -> Self {
        Timestamp::DateTime(Utc::now())
    }
}

fn parse_iso(text: &str) -> Result<i64, TimestampError> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.timestamp());
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc().timestamp());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc().timestamp());
        }
    }

    Err(TimestampError::Iso(text.to_string()))
}

impl From<&str> for Timestamp {
    fn from(text: &str) -> Self {
        Timestamp::Iso(text.to_string())
    }
}

impl From<String> for Timestamp {
    fn from(text: String) -> Self {
        Timestamp::Iso(text)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Timestamp::DateTime(dt)
    }
}

impl From<i64> for Timestamp {
    fn from(secs: i64) -> Self {
        Timestamp::Epoch(secs)
    }
}

impl From<i32> for Timestamp {
    fn from(secs: i32) -> Self {
        Timestamp::Epoch(i64::from(secs))
    }
}

impl From<f64> for Timestamp {
    fn from(secs: f64) -> Self {
        Timestamp::EpochFloat(secs)
    }
}
