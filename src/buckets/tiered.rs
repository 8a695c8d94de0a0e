use super::NormalizedBucket;

/// Merge raw, hourly and daily buckets into one non-overlapping timeline.
///
/// Finer tiers win over coarser ones for any overlapping instant: an hourly
/// bucket is kept only if it does not touch raw coverage, a daily bucket only
/// if it touches neither raw nor kept hourly coverage. Buckets are never split
/// or truncated. The result is sorted by `bucket_start`.
pub fn merge_tiered_buckets(
    raw: Vec<NormalizedBucket>,
    hourly: Vec<NormalizedBucket>,
    daily: Vec<NormalizedBucket>,
) -> Vec<NormalizedBucket> {
    let raw_coverage = coverage(&raw);

    let hourly: Vec<NormalizedBucket> = hourly
        .into_iter()
        .filter(|bucket| !overlaps_any(bucket.range_ms(), &raw_coverage))
        .collect();
    let hourly_coverage = coverage(&hourly);

    let daily = daily.into_iter().filter(|bucket| {
        let range = bucket.range_ms();
        !overlaps_any(range, &raw_coverage) && !overlaps_any(range, &hourly_coverage)
    });

    let mut merged: Vec<NormalizedBucket> = raw.into_iter().chain(hourly).chain(daily).collect();
    merged.sort_by_key(NormalizedBucket::start_ms);
    merged
}

/// Ranges covered by `buckets`, with overlapping or adjacent ranges joined
fn coverage(buckets: &[NormalizedBucket]) -> Vec<(i64, i64)> {
    let mut ranges: Vec<(i64, i64)> = buckets.iter().map(NormalizedBucket::range_ms).collect();
    ranges.sort_unstable();

    let mut joined: Vec<(i64, i64)> = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        match joined.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => joined.push((start, end)),
        }
    }
    joined
}

fn overlaps_any((start, end): (i64, i64), coverage: &[(i64, i64)]) -> bool {
    coverage
        .iter()
        .any(|&(covered_start, covered_end)| start < covered_end && covered_start < end)
}
