use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::HealthStatus;
use crate::storage::{ConfigStore, StorageResult};

/// Reduce check statuses to a system status.
///
/// Any `unhealthy` wins, then any `degraded`; otherwise (including no
/// statuses at all) the system is `healthy`.
pub fn reduce_statuses(statuses: impl IntoIterator<Item = HealthStatus>) -> HealthStatus {
    let mut reduced = HealthStatus::Healthy;
    for status in statuses {
        match status {
            HealthStatus::Unhealthy => return HealthStatus::Unhealthy,
            HealthStatus::Degraded => reduced = HealthStatus::Degraded,
            HealthStatus::Healthy => {}
        }
    }
    reduced
}

/// Latest known state of one check of a system
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckStatus {
    pub config_id: String,
    pub name: String,

    /// `None` if the check never ran or its last status is not recognised
    pub status: Option<HealthStatus>,
    pub latency_ms: Option<u64>,
    pub last_run: Option<DateTime<Utc>>,
}

/// Reduced status of a system plus the per-check inputs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStatus {
    pub system_id: String,
    pub status: HealthStatus,
    pub checks: Vec<CheckStatus>,
}

/// Derive a system's status from the latest run of each enabled check
pub async fn system_status(store: &dyn ConfigStore, system_id: &str) -> StorageResult<SystemStatus> {
    let configurations = store.enabled_checks_for_system(system_id).await?;

    let mut checks = Vec::with_capacity(configurations.len());
    for configuration in configurations {
        let latest = store.latest_run(&configuration.id, system_id).await?;
        checks.push(CheckStatus {
            config_id: configuration.id,
            name: configuration.name,
            status: latest.as_ref().and_then(|run| run.health_status()),
            latency_ms: latest.as_ref().and_then(|run| run.latency_ms),
            last_run: latest.map(|run| run.timestamp),
        });
    }

    Ok(SystemStatus {
        system_id: system_id.to_string(),
        status: reduce_statuses(checks.iter().filter_map(|c| c.status)),
        checks,
    })
}
