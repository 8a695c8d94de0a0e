//! HTTP/HTTPS endpoint check
//!
//! ## Evaluation
//!
//! 1. Status code must match `expected_status` (any 2xx if not configured),
//!    otherwise the run is **unhealthy**
//! 2. Every configured body pattern is evaluated as its own collector
//!    instance; any pattern that does not match makes the run **degraded**
//! 3. Otherwise the run is **healthy**
//!
//! Transport errors (connect, timeout, body read) are returned as errors and
//! recorded by the executor as unhealthy runs.
//!
//! ## Configuration versions
//!
//! - v1: `timeout` in seconds
//! - v2: `timeout_ms` in milliseconds (current)

use std::collections::HashSet;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{instrument, trace};

use super::CheckOutcome;
use super::body_pattern::BodyPatternCollector;
use super::config::{ConfigError, ConfigMigration, ValidateConfig, VersionedConfig, resolve_config};
use crate::HealthStatus;
use crate::aggregate::{AggregateField, AggregateKind, AggregateState, FieldMap};
use crate::registry::HealthCheckStrategy;
use crate::storage::schema::RunRow;

pub const HTTP_STRATEGY_ID: &str = "http";

const CURRENT_VERSION: u32 = 2;

const MIGRATIONS: &[ConfigMigration] = &[ConfigMigration {
    from_version: 1,
    migrate: timeout_secs_to_millis,
}];

const FIELDS: &[AggregateField] = &[
    AggregateField::new("checks", AggregateKind::Counter),
    AggregateField::new("availability", AggregateKind::Rate),
    AggregateField::new("response_time_ms", AggregateKind::Average),
    AggregateField::new("content_length", AggregateKind::MinMax),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Head,
}

/// A named regular expression the response body must match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyPattern {
    /// Collector instance id under which the match result is stored
    pub name: String,
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpCheckConfig {
    pub url: String,

    #[serde(default)]
    pub method: HttpMethod,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Accepted status codes; any 2xx when absent
    #[serde(default)]
    pub expected_status: Option<Vec<u16>>,

    #[serde(default)]
    pub body_patterns: Vec<BodyPattern>,
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl ValidateConfig for HttpCheckConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ConfigError::validation(
                "url",
                "must start with http:// or https://",
            ));
        }

        if self.timeout_ms == 0 {
            return Err(ConfigError::validation("timeout_ms", "must be greater than 0"));
        }

        if let Some(expected) = &self.expected_status {
            if expected.is_empty() {
                return Err(ConfigError::validation(
                    "expected_status",
                    "must list at least one status code",
                ));
            }
        }

        let mut names = HashSet::new();
        for pattern in &self.body_patterns {
            if !names.insert(pattern.name.as_str()) {
                return Err(ConfigError::validation(
                    "body_patterns",
                    format!("duplicate pattern name '{}'", pattern.name),
                ));
            }
            if let Err(e) = regex::Regex::new(&pattern.pattern) {
                return Err(ConfigError::validation(
                    "body_patterns",
                    format!("invalid regex for '{}': {}", pattern.name, e),
                ));
            }
        }

        Ok(())
    }
}

fn timeout_secs_to_millis(mut data: Map<String, Value>) -> Result<Map<String, Value>, ConfigError> {
    if let Some(timeout) = data.remove("timeout") {
        let secs = timeout
            .as_u64()
            .ok_or_else(|| ConfigError::validation("timeout", "must be a whole number of seconds"))?;
        let millis = secs
            .checked_mul(1000)
            .ok_or_else(|| ConfigError::validation("timeout", "is too large"))?;
        data.insert("timeout_ms".to_string(), json!(millis));
    }
    Ok(data)
}

/// HTTP check strategy
///
/// The client is shared across checks; timeouts are applied per request.
pub struct HttpStrategy {
    client: reqwest::Client,
}

impl HttpStrategy {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn resolve(config: &VersionedConfig) -> Result<HttpCheckConfig, ConfigError> {
        resolve_config(config, CURRENT_VERSION, MIGRATIONS)
    }

    /// Execute the HTTP request
    ///
    /// Returns (status_code, body) on success
    async fn execute_request(&self, config: &HttpCheckConfig) -> Result<(u16, String)> {
        let method = match config.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Head => reqwest::Method::HEAD,
        };

        let response = self
            .client
            .request(method, &config.url)
            .timeout(Duration::from_millis(config.timeout_ms))
            .send()
            .await
            .context("HTTP request failed")?;

        let status_code = response.status().as_u16();

        // Get body (skip for HEAD requests)
        let body = if matches!(config.method, HttpMethod::Head) {
            String::new()
        } else {
            response
                .text()
                .await
                .context("Failed to read response body")?
        };

        Ok((status_code, body))
    }
}

impl Default for HttpStrategy {
    fn default() -> Self {
        Self::new()
    }
}

fn status_matches(config: &HttpCheckConfig, status_code: u16) -> bool {
    match &config.expected_status {
        Some(expected) => expected.contains(&status_code),
        None => (200..300).contains(&status_code),
    }
}

#[async_trait]
impl HealthCheckStrategy for HttpStrategy {
    fn id(&self) -> &'static str {
        HTTP_STRATEGY_ID
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
        trace!("checking {}", config.url);

        let start = Instant::now();
        let (status_code, body) = self.execute_request(&config).await?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let mut collectors = Map::new();
        let mut unmatched = Vec::new();
        for pattern in &config.body_patterns {
            // patterns were validated in resolve()
            let matched = regex::Regex::new(&pattern.pattern)
                .map(|re| re.is_match(&body))
                .unwrap_or(false);
            if !matched {
                unmatched.push(pattern.name.as_str());
            }
            collectors.insert(
                pattern.name.clone(),
                BodyPatternCollector::payload(matched),
            );
        }

        let (status, message) = if !status_matches(&config, status_code) {
            (
                HealthStatus::Unhealthy,
                Some(format!("Unexpected status code: {}", status_code)),
            )
        } else if !unmatched.is_empty() {
            (
                HealthStatus::Degraded,
                Some(format!("Body did not match: {}", unmatched.join(", "))),
            )
        } else {
            (HealthStatus::Healthy, None)
        };

        let mut result = json!({
            "status_code": status_code,
            "content_length": body.len(),
        });
        if !collectors.is_empty() {
            result["collectors"] = Value::Object(collectors);
        }

        Ok(CheckOutcome {
            status,
            latency_ms: Some(latency_ms),
            message,
            result,
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
            fields.insert("response_time_ms".to_string(), state);
        }

        let lengths = runs
            .iter()
            .filter_map(|r| r.result.get("content_length").and_then(Value::as_u64))
            .map(|v| v as f64);
        if let Some(state) = AggregateState::min_max_of(lengths) {
            fields.insert("content_length".to_string(), state);
        }

        fields
    }
}
