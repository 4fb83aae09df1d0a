//! Resolution of producer-supplied vehicle timestamps.
//!
//! Feeds disagree on units (seconds vs. milliseconds) and some send garbage,
//! so the raw value is only trusted when it lands in a plausible year.

use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;

/// Raw values at or above this are read as milliseconds.
pub const MILLIS_THRESHOLD: u64 = 10_000_000_000;

/// Inclusive range of calendar years accepted from a feed.
pub const PLAUSIBLE_YEARS: std::ops::RangeInclusive<i32> = 2000..=2050;

/// A timestamp that was present but unusable; the ingestion time was used instead.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("implausible feed timestamp {raw}, using ingestion time instead")]
pub struct TimestampAnomaly {
    pub raw: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalized {
    pub instant: DateTime<Utc>,
    pub anomaly: Option<TimestampAnomaly>,
}

/// Resolves `raw` against `now`, discarding the anomaly signal.
pub fn normalize(raw: Option<u64>, now: DateTime<Utc>) -> DateTime<Utc> {
    normalize_checked(raw, now).instant
}

/// Resolves `raw` against `now`.
///
/// - absent or zero: `now`
/// - below [`MILLIS_THRESHOLD`]: seconds since the epoch, otherwise milliseconds
/// - a candidate outside [`PLAUSIBLE_YEARS`] (UTC) falls back to `now` and
///   carries a [`TimestampAnomaly`]
pub fn normalize_checked(raw: Option<u64>, now: DateTime<Utc>) -> Normalized {
    let raw = match raw {
        Some(raw) if raw > 0 => raw,
        _ => {
            return Normalized {
                instant: now,
                anomaly: None,
            };
        }
    };

    match candidate(raw).filter(|c| PLAUSIBLE_YEARS.contains(&c.year())) {
        Some(instant) => Normalized {
            instant,
            anomaly: None,
        },
        None => Normalized {
            instant: now,
            anomaly: Some(TimestampAnomaly { raw }),
        },
    }
}

fn candidate(raw: u64) -> Option<DateTime<Utc>> {
    let raw = i64::try_from(raw).ok()?;
    if raw < MILLIS_THRESHOLD as i64 {
        DateTime::from_timestamp(raw, 0)
    } else {
        DateTime::from_timestamp_millis(raw)
    }
}
