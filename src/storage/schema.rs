//! Stored row definitions
//!
//! ## Tables
//!
//! - `check_configurations` - what to probe and how often
//! - `system_associations` - which checks run for which system, and whether enabled
//! - `check_runs` - raw per-run results (the **raw** tier)
//! - `check_aggregates` - rolled-up **hourly** and **daily** buckets
//!
//! Run results and aggregated results are stored as JSON so strategies can
//! evolve their payloads without schema migrations. Run statuses are stored as
//! their literal string; readers skip statuses they do not recognise.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::HealthStatus;
use crate::aggregate::AggregatedResult;
use crate::checks::config::VersionedConfig;
use crate::util::{MS_PER_DAY, MS_PER_HOUR};

/// A health check configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckConfigurationRow {
    pub id: String,
    pub name: String,

    /// Registry id of the strategy executing this check
    pub strategy_id: String,

    pub config: VersionedConfig,

    pub interval_secs: u64,
}

/// Link between a system and a check configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemAssociationRow {
    pub system_id: String,
    pub config_id: String,
    pub enabled: bool,
}

/// One execution of a check for a system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRow {
    pub config_id: String,
    pub system_id: String,

    /// Literal status string, normally one of [`HealthStatus`]
    pub status: String,

    pub latency_ms: Option<u64>,

    /// Strategy-specific payload, or `{"error": ...}` for failed probes
    pub result: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

impl RunRow {
    /// Parsed status, `None` if the stored value is not recognised
    pub fn health_status(&self) -> Option<HealthStatus> {
        self.status.parse().ok()
    }
}

/// Granularity of a rolled-up row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateTier {
    Hourly,
    Daily,
}

impl AggregateTier {
    /// Length of one bucket of this tier
    pub fn bucket_ms(&self) -> i64 {
        match self {
            AggregateTier::Hourly => MS_PER_HOUR,
            AggregateTier::Daily => MS_PER_DAY,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateTier::Hourly => "hourly",
            AggregateTier::Daily => "daily",
        }
    }
}

impl std::fmt::Display for AggregateTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rolled-up bucket as persisted by the rollup worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub config_id: String,
    pub system_id: String,
    pub tier: AggregateTier,

    /// Start of the bucket; the end is implied by the tier
    pub bucket_start: DateTime<Utc>,

    pub run_count: u64,
    pub healthy_count: u64,
    pub degraded_count: u64,
    pub unhealthy_count: u64,

    /// Runs in the bucket that recorded a latency
    pub latency_count: u64,
    pub latency_sum_ms: Option<u64>,
    pub min_latency_ms: Option<u64>,
    pub max_latency_ms: Option<u64>,
    pub p95_latency_ms: Option<u64>,

    pub aggregated_result: Option<AggregatedResult>,
}
