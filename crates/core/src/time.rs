//! Timestamps, intervals and the two time axes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{OverlayError, Result};

/// The time axis an annotation record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeKind {
    /// When the fact was true in the modeled world.
    ValidTime,
    /// When the fact was recorded as known by the system.
    TransactionTime,
}

impl fmt::Display for TimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeKind::ValidTime => write!(f, "valid-time"),
            TimeKind::TransactionTime => write!(f, "transaction-time"),
        }
    }
}

/// A canonical UTC instant.
///
/// Parsed from ISO-8601 text and compared chronologically, so
/// `"2024-01-01"` and `"2024-01-01T00:00:00Z"` are the same instant and
/// `"2024-1-5"` is rejected instead of silently misordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Parse an ISO-8601 instant.
    ///
    /// Accepts RFC 3339 (any offset, normalised to UTC), a naive
    /// `YYYY-MM-DDTHH:MM:SS[.f]` taken as UTC, or a plain `YYYY-MM-DD` date
    /// taken as midnight UTC.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self(dt.with_timezone(&Utc)));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
            return Ok(Self(naive.and_utc()));
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            if s.len() == 10 {
                if let Some(naive) = date.and_hms_opt(0, 0, 0) {
                    return Ok(Self(naive.and_utc()));
                }
            }
        }
        Err(OverlayError::InvalidTimestamp(format!(
            "{s:?} is not an ISO-8601 date or date-time"
        )))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl FromStr for Timestamp {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Timestamp::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A closed interval `[from, to]`, open-ended when `to` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Interval {
    from: Timestamp,
    to: Option<Timestamp>,
}

/// Wire form of [`Interval`]; deserialised intervals go through
/// [`Interval::new`] like every other.
#[derive(Deserialize)]
struct RawInterval {
    from: Timestamp,
    #[serde(default)]
    to: Option<Timestamp>,
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = RawInterval::deserialize(deserializer)?;
        Interval::new(raw.from, raw.to).map_err(serde::de::Error::custom)
    }
}

impl Interval {
    /// Build an interval, rejecting `to < from`.
    pub fn new(from: Timestamp, to: Option<Timestamp>) -> Result<Self> {
        if let Some(to) = to {
            if to < from {
                return Err(OverlayError::InvalidInterval(format!(
                    "end {to} is before start {from}"
                )));
            }
        }
        Ok(Self { from, to })
    }

    /// An open-ended interval starting at `from`.
    pub fn starting(from: Timestamp) -> Self {
        Self { from, to: None }
    }

    /// Parse both bounds and validate their order.
    pub fn parse(from: &str, to: Option<&str>) -> Result<Self> {
        let from = Timestamp::parse(from)?;
        let to = to.map(Timestamp::parse).transpose()?;
        Self::new(from, to)
    }

    pub fn from(&self) -> Timestamp {
        self.from
    }

    pub fn to(&self) -> Option<Timestamp> {
        self.to
    }

    /// `from <= at <= to`, with an absent `to` treated as +infinity.
    pub fn contains(&self, at: Timestamp) -> bool {
        self.from <= at && self.to.is_none_or(|to| at <= to)
    }

    /// Does this interval share at least one instant with `[start, end]`?
    pub fn overlaps(&self, start: Timestamp, end: Timestamp) -> bool {
        self.from <= end && self.to.is_none_or(|to| to >= start)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to {
            Some(to) => write!(f, "[{}, {}]", self.from, to),
            None => write!(f, "[{}, ..)", self.from),
        }
    }
}
