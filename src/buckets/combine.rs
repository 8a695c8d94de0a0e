use chrono::{DateTime, Utc};

use super::{NormalizedBucket, SourceTier};
use crate::aggregate::merge_aggregated_bucket_results;
use crate::registry::Registry;

/// Fold `buckets` into a single bucket spanning `[target_start, target_end_ms)`.
///
/// - counts are summed
/// - latency sum, min and max only consider inputs that carry them
/// - p95 is the maximum of the inputs' p95, an upper bound for the true value
/// - the source tier is the least granular tier among the inputs
///
/// An empty input yields a zero-valued raw bucket.
pub fn combine_buckets(
    registry: &Registry,
    strategy_id: &str,
    buckets: &[NormalizedBucket],
    target_start: DateTime<Utc>,
    target_end_ms: i64,
) -> NormalizedBucket {
    let mut combined = NormalizedBucket::empty(target_start, target_end_ms, SourceTier::Raw);

    for bucket in buckets {
        combined.run_count += bucket.run_count;
        combined.healthy_count += bucket.healthy_count;
        combined.degraded_count += bucket.degraded_count;
        combined.unhealthy_count += bucket.unhealthy_count;

        combined.latency_count += bucket.latency_count;
        combined.latency_sum_ms = fold(combined.latency_sum_ms, bucket.latency_sum_ms, |a, b| a + b);
        combined.min_latency_ms = fold(combined.min_latency_ms, bucket.min_latency_ms, u64::min);
        combined.max_latency_ms = fold(combined.max_latency_ms, bucket.max_latency_ms, u64::max);
        combined.p95_latency_ms = fold(combined.p95_latency_ms, bucket.p95_latency_ms, u64::max);

        combined.source_tier = combined.source_tier.max(bucket.source_tier);
    }

    combined.aggregated_result = merge_aggregated_bucket_results(
        registry,
        strategy_id,
        buckets.iter().map(|b| b.aggregated_result.as_ref()),
    );

    combined
}

fn fold(acc: Option<u64>, next: Option<u64>, f: impl Fn(u64, u64) -> u64) -> Option<u64> {
    match (acc, next) {
        (Some(a), Some(b)) => Some(f(a, b)),
        (a, b) => a.or(b),
    }
}
