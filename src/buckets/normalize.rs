use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::{NormalizedBucket, SourceTier};
use crate::aggregate::aggregate_runs;
use crate::registry::Registry;
use crate::stats::{calculate_latency_stats, count_statuses, extract_latencies};
use crate::storage::schema::{AggregateRow, AggregateTier, RunRow};
use crate::util::millis_to_datetime;

/// Build a raw bucket from the runs that fall into `[bucket_start, bucket_end_ms)`.
///
/// `run_count` counts every run, including ones with an unrecognised status;
/// the per-status counts only include recognised ones. The p95 is exact since
/// all samples are available.
pub fn normalize_raw_runs(
    registry: &Registry,
    strategy_id: &str,
    runs: &[RunRow],
    bucket_start: DateTime<Utc>,
    bucket_end_ms: i64,
) -> NormalizedBucket {
    let counts = count_statuses(runs);
    let latencies = extract_latencies(runs);
    let stats = calculate_latency_stats(&latencies);

    NormalizedBucket {
        bucket_start,
        bucket_end_ms,
        run_count: runs.len() as u64,
        healthy_count: counts.healthy,
        degraded_count: counts.degraded,
        unhealthy_count: counts.unhealthy,
        latency_count: latencies.len() as u64,
        latency_sum_ms: stats.map(|s| s.latency_sum_ms),
        min_latency_ms: stats.map(|s| s.min_latency_ms),
        max_latency_ms: stats.map(|s| s.max_latency_ms),
        p95_latency_ms: stats.map(|s| s.p95_latency_ms),
        aggregated_result: aggregate_runs(registry, strategy_id, runs),
        source_tier: SourceTier::Raw,
    }
}

/// Group runs into raw buckets of `interval_ms`, anchored at `range_start_ms`.
///
/// Only buckets that received at least one run are returned, sorted by start.
pub fn raw_runs_to_buckets(
    registry: &Registry,
    strategy_id: &str,
    runs: &[RunRow],
    range_start_ms: i64,
    interval_ms: i64,
) -> Vec<NormalizedBucket> {
    if interval_ms <= 0 {
        return Vec::new();
    }

    let mut groups: BTreeMap<i64, Vec<RunRow>> = BTreeMap::new();
    for run in runs {
        let index = (run.timestamp.timestamp_millis() - range_start_ms).div_euclid(interval_ms);
        groups.entry(index).or_default().push(run.clone());
    }

    groups
        .into_iter()
        .map(|(index, runs)| {
            let start_ms = range_start_ms + index * interval_ms;
            normalize_raw_runs(
                registry,
                strategy_id,
                &runs,
                millis_to_datetime(start_ms),
                start_ms + interval_ms,
            )
        })
        .collect()
}

/// Convert a persisted hourly or daily row into a bucket
pub fn normalize_aggregate(row: &AggregateRow) -> NormalizedBucket {
    let source_tier = match row.tier {
        AggregateTier::Hourly => SourceTier::Hourly,
        AggregateTier::Daily => SourceTier::Daily,
    };

    NormalizedBucket {
        bucket_start: row.bucket_start,
        bucket_end_ms: row.bucket_start.timestamp_millis() + row.tier.bucket_ms(),
        run_count: row.run_count,
        healthy_count: row.healthy_count,
        degraded_count: row.degraded_count,
        unhealthy_count: row.unhealthy_count,
        latency_count: row.latency_count,
        latency_sum_ms: row.latency_sum_ms,
        min_latency_ms: row.min_latency_ms,
        max_latency_ms: row.max_latency_ms,
        p95_latency_ms: row.p95_latency_ms,
        aggregated_result: row.aggregated_result.clone(),
        source_tier,
    }
}

impl NormalizedBucket {
    /// Persistable row for this bucket at the given tier
    pub fn to_aggregate_row(&self, config_id: &str, system_id: &str, tier: AggregateTier) -> AggregateRow {
        AggregateRow {
            config_id: config_id.to_string(),
            system_id: system_id.to_string(),
            tier,
            bucket_start: self.bucket_start,
            run_count: self.run_count,
            healthy_count: self.healthy_count,
            degraded_count: self.degraded_count,
            unhealthy_count: self.unhealthy_count,
            latency_count: self.latency_count,
            latency_sum_ms: self.latency_sum_ms,
            min_latency_ms: self.min_latency_ms,
            max_latency_ms: self.max_latency_ms,
            p95_latency_ms: self.p95_latency_ms,
            aggregated_result: self.aggregated_result.clone(),
        }
    }
}
