//! Query-time history reads
//!
//! Combines all three tiers into one display timeline:
//!
//! 1. raw runs in range → raw buckets of `min(interval, 1h)` anchored at `start`
//! 2. hourly and daily rows overlapping the range → normalized buckets
//! 3. [`merge_tiered_buckets`] so raw data wins wherever it exists
//! 4. [`reaggregate_buckets`] to the requested interval, last bucket ending at `end`

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::aggregate::AggregatedResult;
use crate::buckets::{
    NormalizedBucket, SourceTier, merge_tiered_buckets, normalize_aggregate, raw_runs_to_buckets,
    reaggregate_buckets,
};
use crate::registry::Registry;
use crate::storage::{AggregateTier, ConfigStore, StorageError};
use crate::util::{MS_PER_HOUR, millis_to_datetime};

/// A history request for one association
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub config_id: String,
    pub system_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub interval_secs: u64,
}

/// One bucket of the display timeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryBucket {
    pub bucket_start: DateTime<Utc>,
    pub bucket_end: DateTime<Utc>,

    pub run_count: u64,
    pub healthy_count: u64,
    pub degraded_count: u64,
    pub unhealthy_count: u64,

    pub avg_latency_ms: Option<u64>,
    pub min_latency_ms: Option<u64>,
    pub max_latency_ms: Option<u64>,
    pub p95_latency_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregated_result: Option<AggregatedResult>,

    pub source_tier: SourceTier,
}

impl From<NormalizedBucket> for HistoryBucket {
    fn from(bucket: NormalizedBucket) -> Self {
        // Runs without a latency do not count toward the average
        let avg_latency_ms = match (bucket.latency_sum_ms, bucket.latency_count) {
            (Some(sum), count) if count > 0 => Some((sum + count / 2) / count),
            _ => None,
        };

        Self {
            bucket_start: bucket.bucket_start,
            bucket_end: millis_to_datetime(bucket.bucket_end_ms),
            run_count: bucket.run_count,
            healthy_count: bucket.healthy_count,
            degraded_count: bucket.degraded_count,
            unhealthy_count: bucket.unhealthy_count,
            avg_latency_ms,
            min_latency_ms: bucket.min_latency_ms,
            max_latency_ms: bucket.max_latency_ms,
            p95_latency_ms: bucket.p95_latency_ms,
            aggregated_result: bucket.aggregated_result,
            source_tier: bucket.source_tier,
        }
    }
}

#[derive(Debug)]
pub enum HistoryError {
    /// `end <= start` or a zero interval
    InvalidRange(String),

    /// The requested configuration does not exist
    UnknownCheck(String),

    Storage(StorageError),
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryError::InvalidRange(msg) => write!(f, "invalid history range: {}", msg),
            HistoryError::UnknownCheck(id) => write!(f, "unknown check configuration '{}'", id),
            HistoryError::Storage(err) => write!(f, "history storage error: {}", err),
        }
    }
}

impl std::error::Error for HistoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HistoryError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for HistoryError {
    fn from(err: StorageError) -> Self {
        HistoryError::Storage(err)
    }
}

/// Build the display timeline for `query`
#[instrument(skip(store, registry))]
pub async fn fetch_history(
    store: &dyn ConfigStore,
    registry: &Registry,
    query: &HistoryQuery,
) -> Result<Vec<HistoryBucket>, HistoryError> {
    if query.end <= query.start {
        return Err(HistoryError::InvalidRange(format!(
            "end {} is not after start {}",
            query.end, query.start
        )));
    }
    if query.interval_secs == 0 {
        return Err(HistoryError::InvalidRange("interval must be positive".to_string()));
    }
    let interval_ms = i64::try_from(query.interval_secs)
        .ok()
        .and_then(|secs| secs.checked_mul(1000))
        .ok_or_else(|| {
            HistoryError::InvalidRange(format!("interval of {}s is too large", query.interval_secs))
        })?;

    let configuration = store
        .find_configuration(&query.config_id)
        .await?
        .ok_or_else(|| HistoryError::UnknownCheck(query.config_id.clone()))?;
    let strategy_id = configuration.strategy_id.as_str();

    let raw_interval_ms = interval_ms.min(MS_PER_HOUR);

    let runs = store
        .runs_in_range(&query.config_id, &query.system_id, query.start, query.end)
        .await?;
    let raw = raw_runs_to_buckets(
        registry,
        strategy_id,
        &runs,
        query.start.timestamp_millis(),
        raw_interval_ms,
    );

    let hourly = load_tier(store, query, AggregateTier::Hourly).await?;
    let daily = load_tier(store, query, AggregateTier::Daily).await?;

    debug!(
        raw = raw.len(),
        hourly = hourly.len(),
        daily = daily.len(),
        "merging history tiers"
    );

    let merged = merge_tiered_buckets(raw, hourly, daily);
    let timeline = reaggregate_buckets(
        registry,
        strategy_id,
        &merged,
        interval_ms,
        query.start,
        query.end,
    );

    Ok(timeline.into_iter().map(HistoryBucket::from).collect())
}

async fn load_tier(
    store: &dyn ConfigStore,
    query: &HistoryQuery,
    tier: AggregateTier,
) -> Result<Vec<NormalizedBucket>, StorageError> {
    let rows = store
        .aggregates_in_range(&query.config_id, &query.system_id, tier, query.start, query.end)
        .await?;
    Ok(rows.iter().map(normalize_aggregate).collect())
}
