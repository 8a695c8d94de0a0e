//! In-memory storage backend (no persistence)
//!
//! This backend keeps all tables in memory behind a Tokio `RwLock`.
//! It's useful for:
//! - Testing without database dependencies
//! - Running the hub without a database (`"backend": "none"`)
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart, so bootstrap always
//!   schedules checks immediately

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{BackendHealth, ConfigStore, EnabledCheck};
use super::error::{StorageError, StorageResult};
use super::schema::{
    AggregateRow, AggregateTier, CheckConfigurationRow, RunRow, SystemAssociationRow,
};

type AggregateKey = (String, String, AggregateTier, i64);

#[derive(Default)]
struct Tables {
    configurations: HashMap<String, CheckConfigurationRow>,

    /// Keyed by (system_id, config_id)
    associations: BTreeMap<(String, String), SystemAssociationRow>,

    runs: Vec<RunRow>,

    aggregates: HashMap<AggregateKey, AggregateRow>,
}

/// In-memory configuration store
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn upsert_configuration(&self, configuration: CheckConfigurationRow) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .configurations
            .insert(configuration.id.clone(), configuration);
        Ok(())
    }

    async fn upsert_association(&self, association: SystemAssociationRow) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.configurations.contains_key(&association.config_id) {
            return Err(StorageError::NotFound(format!(
                "check configuration '{}'",
                association.config_id
            )));
        }
        tables.associations.insert(
            (association.system_id.clone(), association.config_id.clone()),
            association,
        );
        Ok(())
    }

    async fn delete_association(&self, system_id: &str, config_id: &str) -> StorageResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .associations
            .remove(&(system_id.to_string(), config_id.to_string()))
            .is_some())
    }

    async fn list_associations(&self) -> StorageResult<Vec<SystemAssociationRow>> {
        let tables = self.tables.read().await;
        Ok(tables.associations.values().cloned().collect())
    }

    async fn find_configuration(&self, config_id: &str) -> StorageResult<Option<CheckConfigurationRow>> {
        let tables = self.tables.read().await;
        Ok(tables.configurations.get(config_id).cloned())
    }

    async fn enabled_checks(&self) -> StorageResult<Vec<EnabledCheck>> {
        let tables = self.tables.read().await;
        Ok(tables
            .associations
            .values()
            .filter(|a| a.enabled)
            .filter_map(|a| {
                tables
                    .configurations
                    .get(&a.config_id)
                    .map(|configuration| EnabledCheck {
                        system_id: a.system_id.clone(),
                        configuration: configuration.clone(),
                    })
            })
            .collect())
    }

    async fn find_enabled_check(
        &self,
        config_id: &str,
        system_id: &str,
    ) -> StorageResult<Option<CheckConfigurationRow>> {
        let tables = self.tables.read().await;
        let enabled = tables
            .associations
            .get(&(system_id.to_string(), config_id.to_string()))
            .is_some_and(|a| a.enabled);

        Ok(enabled
            .then(|| tables.configurations.get(config_id).cloned())
            .flatten())
    }

    async fn enabled_checks_for_system(&self, system_id: &str) -> StorageResult<Vec<CheckConfigurationRow>> {
        let tables = self.tables.read().await;
        Ok(tables
            .associations
            .values()
            .filter(|a| a.enabled && a.system_id == system_id)
            .filter_map(|a| tables.configurations.get(&a.config_id).cloned())
            .collect())
    }

    async fn insert_run(&self, run: RunRow) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        tables.runs.push(run);
        Ok(())
    }

    async fn latest_run(&self, config_id: &str, system_id: &str) -> StorageResult<Option<RunRow>> {
        let tables = self.tables.read().await;
        Ok(tables
            .runs
            .iter()
            .filter(|r| r.config_id == config_id && r.system_id == system_id)
            .max_by_key(|r| r.timestamp)
            .cloned())
    }

    async fn runs_in_range(
        &self,
        config_id: &str,
        system_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<RunRow>> {
        let tables = self.tables.read().await;
        let mut runs: Vec<RunRow> = tables
            .runs
            .iter()
            .filter(|r| r.config_id == config_id && r.system_id == system_id)
            .filter(|r| r.timestamp >= start && r.timestamp < end)
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.timestamp);
        Ok(runs)
    }

    async fn delete_runs_before(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let mut tables = self.tables.write().await;
        let count = tables.runs.len();
        tables.runs.retain(|r| r.timestamp >= before);
        let deleted = count - tables.runs.len();
        debug!("deleted {deleted} runs from memory store");
        Ok(deleted)
    }

    async fn upsert_aggregate(&self, row: AggregateRow) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let key = (
            row.config_id.clone(),
            row.system_id.clone(),
            row.tier,
            row.bucket_start.timestamp_millis(),
        );
        tables.aggregates.insert(key, row);
        Ok(())
    }

    async fn aggregates_in_range(
        &self,
        config_id: &str,
        system_id: &str,
        tier: AggregateTier,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<AggregateRow>> {
        let tables = self.tables.read().await;
        let (start_ms, end_ms) = (start.timestamp_millis(), end.timestamp_millis());

        let mut rows: Vec<AggregateRow> = tables
            .aggregates
            .values()
            .filter(|r| r.config_id == config_id && r.system_id == system_id && r.tier == tier)
            .filter(|r| {
                let bucket_start = r.bucket_start.timestamp_millis();
                bucket_start < end_ms && bucket_start + tier.bucket_ms() > start_ms
            })
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.bucket_start);
        Ok(rows)
    }

    async fn delete_aggregates_before(
        &self,
        tier: AggregateTier,
        before: DateTime<Utc>,
    ) -> StorageResult<usize> {
        let mut tables = self.tables.write().await;
        let count = tables.aggregates.len();
        tables
            .aggregates
            .retain(|_, r| r.tier != tier || r.bucket_start >= before);
        Ok(count - tables.aggregates.len())
    }

    async fn health_check(&self) -> StorageResult<BackendHealth> {
        let tables = self.tables.read().await;
        Ok(BackendHealth {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("runs".to_string(), tables.runs.len().to_string()),
                ("aggregates".to_string(), tables.aggregates.len().to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory store (no-op)");
        Ok(())
    }
}
