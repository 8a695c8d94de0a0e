//! Normalized buckets and the pure functions that fold them
//!
//! Every tier (raw runs, hourly rows, daily rows) is first converted into a
//! [`NormalizedBucket`]. From there the same three steps serve both the rollup
//! worker and query-time reads:
//!
//! ```text
//! raw runs ──normalize──┐
//! hourly rows ──────────┼──> merge_tiered_buckets ──> reaggregate_buckets ──> timeline
//! daily rows ───────────┘                                   │
//!                                                      combine_buckets
//! ```
//!
//! All functions here are deterministic: given the same inputs they produce
//! bit-identical output, so rollups can be re-run safely.

mod combine;
mod normalize;
mod reaggregate;
mod tiered;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::AggregatedResult;

pub use combine::combine_buckets;
pub use normalize::{normalize_aggregate, normalize_raw_runs, raw_runs_to_buckets};
pub use reaggregate::reaggregate_buckets;
pub use tiered::merge_tiered_buckets;

/// Where a bucket's data came from.
///
/// Ordered by granularity: `Raw < Hourly < Daily`. A combined bucket reports
/// the least granular (greatest) tier among its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTier {
    Raw,
    Hourly,
    Daily,
}

/// A time bucket in tier-independent shape
///
/// `bucket_end_ms` is the exclusive end as absolute epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBucket {
    pub bucket_start: DateTime<Utc>,
    pub bucket_end_ms: i64,

    pub run_count: u64,
    pub healthy_count: u64,
    pub degraded_count: u64,
    pub unhealthy_count: u64,

    /// Runs that recorded a latency; the divisor for the average
    pub latency_count: u64,
    pub latency_sum_ms: Option<u64>,
    pub min_latency_ms: Option<u64>,
    pub max_latency_ms: Option<u64>,
    pub p95_latency_ms: Option<u64>,

    pub aggregated_result: Option<AggregatedResult>,

    pub source_tier: SourceTier,
}

impl NormalizedBucket {
    /// An empty bucket spanning `[bucket_start, bucket_end_ms)`
    pub fn empty(bucket_start: DateTime<Utc>, bucket_end_ms: i64, source_tier: SourceTier) -> Self {
        Self {
            bucket_start,
            bucket_end_ms,
            run_count: 0,
            healthy_count: 0,
            degraded_count: 0,
            unhealthy_count: 0,
            latency_count: 0,
            latency_sum_ms: None,
            min_latency_ms: None,
            max_latency_ms: None,
            p95_latency_ms: None,
            aggregated_result: None,
            source_tier,
        }
    }

    pub fn start_ms(&self) -> i64 {
        self.bucket_start.timestamp_millis()
    }

    /// `[start, end)` in epoch milliseconds
    pub fn range_ms(&self) -> (i64, i64) {
        (self.start_ms(), self.bucket_end_ms)
    }
}
