//! Latency and status statistics over raw run records
//!
//! These are pure functions used both when a raw bucket is built for a query
//! and when the rollup worker produces hourly rows. The percentile uses the
//! nearest-rank method with an upper bias, so p95 over `1..=10` yields `10`.

use serde::{Deserialize, Serialize};

use crate::HealthStatus;
use crate::storage::schema::RunRow;

/// Summary of a non-empty set of latencies.
///
/// There is no partially populated variant: callers receive
/// `Option<LatencyStats>`, which is `None` exactly when there was no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub latency_sum_ms: u64,
    pub avg_latency_ms: u64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub p95_latency_ms: u64,
}

/// Number of runs per recognised status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub healthy: u64,
    pub degraded: u64,
    pub unhealthy: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.healthy + self.degraded + self.unhealthy
    }

    fn record(&mut self, status: HealthStatus) {
        match status {
            HealthStatus::Healthy => self.healthy += 1,
            HealthStatus::Degraded => self.degraded += 1,
            HealthStatus::Unhealthy => self.unhealthy += 1,
        }
    }
}

/// Nearest-rank percentile.
///
/// Sorts a copy of `values` and picks index `ceil(p / 100 * n) - 1`, clamped
/// into the valid range. Returns `None` for an empty slice.
pub fn calculate_percentile(values: &[u64], p: f64) -> Option<u64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    let rank = (p / 100.0 * sorted.len() as f64).ceil() as i64 - 1;
    let index = rank.clamp(0, sorted.len() as i64 - 1) as usize;

    Some(sorted[index])
}

/// Sum, average, min, max and p95 of the given latencies.
///
/// The average is rounded to the nearest integer with ties rounding up.
pub fn calculate_latency_stats(latencies: &[u64]) -> Option<LatencyStats> {
    let p95 = calculate_percentile(latencies, 95.0)?;

    let n = latencies.len() as u64;
    let sum: u64 = latencies.iter().sum();
    let min = latencies.iter().copied().min()?;
    let max = latencies.iter().copied().max()?;

    Some(LatencyStats {
        latency_sum_ms: sum,
        avg_latency_ms: (sum + n / 2) / n,
        min_latency_ms: min,
        max_latency_ms: max,
        p95_latency_ms: p95,
    })
}

/// Tally runs by their stored status string.
///
/// Statuses this version does not know about are skipped so rows written by a
/// newer writer do not break older readers.
pub fn count_statuses(runs: &[RunRow]) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for status in runs.iter().filter_map(|run| run.health_status()) {
        counts.record(status);
    }
    counts
}

/// Latencies of all runs that recorded one. Runs without latency are skipped.
pub fn extract_latencies(runs: &[RunRow]) -> Vec<u64> {
    runs.iter().filter_map(|run| run.latency_ms).collect()
}
