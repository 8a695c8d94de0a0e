use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::{NormalizedBucket, combine_buckets};
use crate::registry::Registry;
use crate::util::millis_to_datetime;

/// Regroup buckets into `target_interval_ms` buckets anchored at `range_start`.
///
/// A bucket belongs to target index `floor((start - range_start) / interval)`;
/// buckets starting before `range_start` fall into negative indices rather
/// than being dropped. The last target bucket is stretched to `range_end` if
/// it would otherwise end earlier. Output is sorted by start.
pub fn reaggregate_buckets(
    registry: &Registry,
    strategy_id: &str,
    buckets: &[NormalizedBucket],
    target_interval_ms: i64,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
) -> Vec<NormalizedBucket> {
    if buckets.is_empty() || target_interval_ms <= 0 {
        return Vec::new();
    }

    let anchor = range_start.timestamp_millis();

    let mut groups: BTreeMap<i64, Vec<NormalizedBucket>> = BTreeMap::new();
    for bucket in buckets {
        let index = (bucket.start_ms() - anchor).div_euclid(target_interval_ms);
        groups.entry(index).or_default().push(bucket.clone());
    }

    let last_index = groups.keys().next_back().copied();

    groups
        .into_iter()
        .map(|(index, members)| {
            let start_ms = anchor + index * target_interval_ms;
            let mut end_ms = start_ms + target_interval_ms;
            if Some(index) == last_index {
                end_ms = end_ms.max(range_end.timestamp_millis());
            }
            combine_buckets(
                registry,
                strategy_id,
                &members,
                millis_to_datetime(start_ms),
                end_ms,
            )
        })
        .collect()
}
