//! Built-in health check strategies and collectors
//!
//! - [`http::HttpStrategy`] - HTTP/HTTPS endpoint checks with status code and body pattern validation
//! - [`tcp::TcpStrategy`] - plain TCP connect checks
//! - [`body_pattern::BodyPatternCollector`] - per-pattern match rates for HTTP checks
//!
//! Further strategies plug in through [`crate::registry::HealthCheckStrategy`].

pub mod body_pattern;
pub mod config;
pub mod http;
pub mod tcp;

use serde_json::Value;

use crate::HealthStatus;

/// Result of executing a strategy once
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub status: HealthStatus,

    /// Time the probe took, if it got far enough to measure one
    pub latency_ms: Option<u64>,

    /// Human-readable explanation for non-healthy outcomes
    pub message: Option<String>,

    /// Strategy-specific result payload, stored verbatim on the run
    pub result: Value,
}

/// Count of runs whose stored status is `healthy`
pub(crate) fn healthy_runs(runs: &[crate::storage::schema::RunRow]) -> u64 {
    runs.iter()
        .filter(|run| run.health_status() == Some(HealthStatus::Healthy))
        .count() as u64
}
