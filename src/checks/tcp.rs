//! TCP connect check
//!
//! A run is healthy when a connection to `host:port` is established within
//! `timeout_ms`. Refused connections and timeouts are errors.

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpStream;
use tracing::{instrument, trace};

use super::CheckOutcome;
use super::config::{ConfigError, ValidateConfig, VersionedConfig, resolve_config};
use crate::HealthStatus;
use crate::aggregate::{AggregateField, AggregateKind, AggregateState, FieldMap};
use crate::registry::HealthCheckStrategy;
use crate::storage::schema::RunRow;

pub const TCP_STRATEGY_ID: &str = "tcp";

const CURRENT_VERSION: u32 = 1;

const FIELDS: &[AggregateField] = &[
    AggregateField::new("checks", AggregateKind::Counter),
    AggregateField::new("availability", AggregateKind::Rate),
    AggregateField::new("connect_time_ms", AggregateKind::Average),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcpCheckConfig {
    pub host: String,
    pub port: u16,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl ValidateConfig for TcpCheckConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::validation("host", "must not be empty"));
        }
        if self.port == 0 {
            return Err(ConfigError::validation("port", "must not be 0"));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::validation("timeout_ms", "must be greater than 0"));
        }
        Ok(())
    }
}

pub struct TcpStrategy;

impl TcpStrategy {
    pub fn resolve(config: &VersionedConfig) -> Result<TcpCheckConfig, ConfigError> {
        resolve_config(config, CURRENT_VERSION, &[])
    }
}

#[async_trait]
impl HealthCheckStrategy for TcpStrategy {
    fn id(&self) -> &'static str {
        TCP_STRATEGY_ID
    }

    fn declared_fields(&self) -> &'static [AggregateField] {
        FIELDS
    }

    fn validate_config(&self, config: &VersionedConfig) -> Result<(), ConfigError> {
        Self::resolve(config).map(|_| ())
    }

    #[instrument(skip_all)]
    async fn execute(&self, config: &VersionedConfig) -> Result<CheckOutcome> {
        let config = Self::resolve(config)?;
        let address = format!("{}:{}", config.host, config.port);
        trace!("connecting to {address}");

        let start = Instant::now();
        let connect = TcpStream::connect((config.host.as_str(), config.port));
        let stream = match tokio::time::timeout(Duration::from_millis(config.timeout_ms), connect).await
        {
            Ok(stream) => stream.with_context(|| format!("connection to {address} failed"))?,
            Err(_) => bail!("connection to {address} timed out after {}ms", config.timeout_ms),
        };
        let latency_ms = start.elapsed().as_millis() as u64;
        drop(stream);

        Ok(CheckOutcome {
            status: HealthStatus::Healthy,
            latency_ms: Some(latency_ms),
            message: None,
            result: json!({ "address": address }),
        })
    }

    fn aggregate_runs(&self, runs: &[RunRow]) -> FieldMap {
        let mut fields = FieldMap::new();
        if runs.is_empty() {
            return fields;
        }

        let total = runs.len() as u64;
        fields.insert("checks".to_string(), AggregateState::counter(total));
        fields.insert(
            "availability".to_string(),
            AggregateState::rate(super::healthy_runs(runs), total),
        );
        if let Some(state) =
            AggregateState::average_of(runs.iter().filter_map(|r| r.latency_ms).map(|v| v as f64))
        {
            fields.insert("connect_time_ms".to_string(), state);
        }

        fields
    }
}
