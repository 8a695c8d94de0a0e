pub mod aggregate;
pub mod api;
pub mod buckets;
pub mod checks;
pub mod config;
pub mod history;
pub mod queue;
pub mod registry;
pub mod rollup;
pub mod scheduler;
pub mod stats;
pub mod storage;
pub mod util;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Outcome of a single health check run, and of a system as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Lowercase representation, identical to the serde format.
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(HealthStatus::Healthy),
            "degraded" => Ok(HealthStatus::Degraded),
            "unhealthy" => Ok(HealthStatus::Unhealthy),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A stored status string that is not one of the known [`HealthStatus`] values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl std::fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown health status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}
