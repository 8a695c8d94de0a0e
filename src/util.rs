//! Time helpers shared by the bucketing, rollup and scheduling code.
//!
//! All bucket arithmetic is done on epoch milliseconds; `DateTime<Utc>` is
//! only used at the edges (rows, API).

use chrono::{DateTime, Utc};

pub const MS_PER_MINUTE: i64 = 60_000;

pub const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;

pub const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

/// Convert epoch milliseconds into a timestamp.
///
/// Out-of-range values clamp to the Unix epoch instead of panicking.
pub fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Floor `millis` to a multiple of `step_ms` (Euclidean, so negative values floor downwards).
pub fn floor_to(millis: i64, step_ms: i64) -> i64 {
    millis.div_euclid(step_ms) * step_ms
}

pub fn floor_to_hour(at: DateTime<Utc>) -> DateTime<Utc> {
    millis_to_datetime(floor_to(at.timestamp_millis(), MS_PER_HOUR))
}

pub fn floor_to_day(at: DateTime<Utc>) -> DateTime<Utc> {
    millis_to_datetime(floor_to(at.timestamp_millis(), MS_PER_DAY))
}
