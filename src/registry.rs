//! Strategy and collector registry
//!
//! Check strategies (HTTP, TCP, ...) and the collectors that contribute
//! sub-results to them are plugins identified by string ids. The registry is
//! assembled once at startup with [`RegistryBuilder`] and then shared
//! read-only (`Arc<Registry>`) with the scheduler, the rollup worker and the
//! query path.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::aggregate::{AggregateField, FieldMap, merge_declared_fields};
use crate::checks::CheckOutcome;
use crate::checks::config::{ConfigError, VersionedConfig};
use crate::storage::schema::RunRow;

/// A health check implementation
///
/// ## Responsibilities
///
/// - **execute**: run the probe against a stored configuration
/// - **aggregate_runs**: turn raw runs into strategy-level aggregate state
/// - **merge_result**: combine two aggregate states losslessly
///
/// `merge_result` defaults to merging by [`declared_fields`](Self::declared_fields),
/// which is enough for every strategy built from the standard field kinds.
#[async_trait]
pub trait HealthCheckStrategy: Send + Sync {
    /// Registry id, also stored as `strategy_id` on configurations
    fn id(&self) -> &'static str;

    /// Aggregate fields this strategy produces and how they merge
    fn declared_fields(&self) -> &'static [AggregateField];

    /// Check that a stored configuration migrates and validates
    fn validate_config(&self, config: &VersionedConfig) -> Result<(), ConfigError>;

    /// Run the probe
    ///
    /// Errors are treated as probe failures by the caller and recorded as
    /// unhealthy runs; they are never retried.
    async fn execute(&self, config: &VersionedConfig) -> anyhow::Result<CheckOutcome>;

    /// Build strategy-level aggregate state from raw runs
    fn aggregate_runs(&self, runs: &[RunRow]) -> FieldMap;

    fn merge_result(&self, a: &FieldMap, b: &FieldMap) -> FieldMap {
        merge_declared_fields(self.declared_fields(), a, b)
    }
}

/// A sub-result producer attached to a strategy's runs
///
/// Each run result may carry several collector instances under its
/// `collectors` key; every instance is aggregated and merged on its own.
pub trait Collector: Send + Sync {
    fn id(&self) -> &'static str;

    fn declared_fields(&self) -> &'static [AggregateField];

    /// Build aggregate state from the per-run payloads of one collector instance
    fn aggregate_instance(&self, results: &[&serde_json::Value]) -> FieldMap;

    fn merge_result(&self, a: &FieldMap, b: &FieldMap) -> FieldMap {
        merge_declared_fields(self.declared_fields(), a, b)
    }
}

/// Lookup table from id to strategy / collector implementation
#[derive(Clone, Default)]
pub struct Registry {
    strategies: HashMap<String, Arc<dyn HealthCheckStrategy>>,
    collectors: HashMap<String, Arc<dyn Collector>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry with the strategies and collectors shipped in this crate
    pub fn with_builtins() -> Self {
        Self::builder()
            .strategy(crate::checks::http::HttpStrategy::new())
            .strategy(crate::checks::tcp::TcpStrategy)
            .collector(crate::checks::body_pattern::BodyPatternCollector)
            .build()
    }

    pub fn strategy(&self, id: &str) -> Option<Arc<dyn HealthCheckStrategy>> {
        self.strategies.get(id).cloned()
    }

    pub fn collector(&self, id: &str) -> Option<Arc<dyn Collector>> {
        self.collectors.get(id).cloned()
    }

    /// Registered strategy ids, sorted
    pub fn strategy_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.strategies.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut collectors: Vec<&String> = self.collectors.keys().collect();
        collectors.sort_unstable();
        f.debug_struct("Registry")
            .field("strategies", &self.strategy_ids())
            .field("collectors", &collectors)
            .finish()
    }
}

/// Builder for [`Registry`]. Later registrations with the same id replace earlier ones.
#[derive(Default)]
pub struct RegistryBuilder {
    registry: Registry,
}

impl RegistryBuilder {
    pub fn strategy(mut self, strategy: impl HealthCheckStrategy + 'static) -> Self {
        self.registry
            .strategies
            .insert(strategy.id().to_string(), Arc::new(strategy));
        self
    }

    pub fn collector(mut self, collector: impl Collector + 'static) -> Self {
        self.registry
            .collectors
            .insert(collector.id().to_string(), Arc::new(collector));
        self
    }

    pub fn build(self) -> Registry {
        self.registry
    }
}
