//! Helper functions for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use healthwatch::HealthStatus;
use healthwatch::checks::config::VersionedConfig;
use healthwatch::queue::MemoryQueue;
use healthwatch::registry::Registry;
use healthwatch::scheduler::{HealthCheckScheduler, SystemCatalog};
use healthwatch::storage::{
    AggregateRow, AggregateTier, BackendHealth, CheckConfigurationRow, ConfigStore, EnabledCheck,
    MemoryStore, RunRow, StorageError, StorageResult, SystemAssociationRow,
};
use serde_json::json;
use tokio::sync::{Mutex, mpsc};

/// Catalog recording every update and forwarding it to a channel
pub struct RecordingCatalog {
    updates: Mutex<Vec<(String, HealthStatus)>>,
    tx: mpsc::UnboundedSender<(String, HealthStatus)>,
}

impl RecordingCatalog {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(String, HealthStatus)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let catalog = Arc::new(Self {
            updates: Mutex::new(Vec::new()),
            tx,
        });
        (catalog, rx)
    }

    pub async fn updates(&self) -> Vec<(String, HealthStatus)> {
        self.updates.lock().await.clone()
    }
}

#[async_trait]
impl SystemCatalog for RecordingCatalog {
    async fn update_system_status(&self, system_id: &str, status: HealthStatus) -> anyhow::Result<()> {
        self.updates.lock().await.push((system_id.to_string(), status));
        let _ = self.tx.send((system_id.to_string(), status));
        Ok(())
    }
}

/// Catalog that rejects every update
#[derive(Default)]
pub struct FailingCatalog {
    attempts: AtomicUsize,
}

impl FailingCatalog {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SystemCatalog for FailingCatalog {
    async fn update_system_status(&self, system_id: &str, _status: HealthStatus) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("catalog rejected update for {system_id}")
    }
}

/// Store wrapper that can be switched to fail run writes or check lookups
pub struct FaultyStore {
    pub inner: MemoryStore,
    pub fail_run_writes: AtomicBool,
    pub fail_check_lookups: AtomicBool,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_run_writes: AtomicBool::new(false),
            fail_check_lookups: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ConfigStore for FaultyStore {
    async fn upsert_configuration(&self, configuration: CheckConfigurationRow) -> StorageResult<()> {
        self.inner.upsert_configuration(configuration).await
    }

    async fn upsert_association(&self, association: SystemAssociationRow) -> StorageResult<()> {
        self.inner.upsert_association(association).await
    }

    async fn delete_association(&self, system_id: &str, config_id: &str) -> StorageResult<bool> {
        self.inner.delete_association(system_id, config_id).await
    }

    async fn list_associations(&self) -> StorageResult<Vec<SystemAssociationRow>> {
        self.inner.list_associations().await
    }

    async fn find_configuration(&self, config_id: &str) -> StorageResult<Option<CheckConfigurationRow>> {
        self.inner.find_configuration(config_id).await
    }

    async fn enabled_checks(&self) -> StorageResult<Vec<EnabledCheck>> {
        self.inner.enabled_checks().await
    }

    async fn find_enabled_check(
        &self,
        config_id: &str,
        system_id: &str,
    ) -> StorageResult<Option<CheckConfigurationRow>> {
        if self.fail_check_lookups.load(Ordering::SeqCst) {
            return Err(StorageError::QueryFailed("lookup failed".to_string()));
        }
        self.inner.find_enabled_check(config_id, system_id).await
    }

    async fn enabled_checks_for_system(&self, system_id: &str) -> StorageResult<Vec<CheckConfigurationRow>> {
        self.inner.enabled_checks_for_system(system_id).await
    }

    async fn insert_run(&self, run: RunRow) -> StorageResult<()> {
        if self.fail_run_writes.load(Ordering::SeqCst) {
            return Err(StorageError::QueryFailed("disk full".to_string()));
        }
        self.inner.insert_run(run).await
    }

    async fn latest_run(&self, config_id: &str, system_id: &str) -> StorageResult<Option<RunRow>> {
        self.inner.latest_run(config_id, system_id).await
    }

    async fn runs_in_range(
        &self,
        config_id: &str,
        system_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<RunRow>> {
        self.inner.runs_in_range(config_id, system_id, start, end).await
    }

    async fn delete_runs_before(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        self.inner.delete_runs_before(before).await
    }

    async fn upsert_aggregate(&self, row: AggregateRow) -> StorageResult<()> {
        self.inner.upsert_aggregate(row).await
    }

    async fn aggregates_in_range(
        &self,
        config_id: &str,
        system_id: &str,
        tier: AggregateTier,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<AggregateRow>> {
        self.inner
            .aggregates_in_range(config_id, system_id, tier, start, end)
            .await
    }

    async fn delete_aggregates_before(
        &self,
        tier: AggregateTier,
        before: DateTime<Utc>,
    ) -> StorageResult<usize> {
        self.inner.delete_aggregates_before(tier, before).await
    }

    async fn health_check(&self) -> StorageResult<BackendHealth> {
        Ok(BackendHealth {
            healthy: true,
            message: "faulty wrapper".to_string(),
            metadata: HashMap::new(),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        self.inner.close().await
    }
}

/// A scheduler over the given store and catalog
pub fn scheduler_with(
    store: Arc<dyn ConfigStore>,
    catalog: Arc<dyn SystemCatalog>,
) -> Arc<HealthCheckScheduler> {
    Arc::new(HealthCheckScheduler::new(
        store,
        Arc::new(Registry::with_builtins()),
        Arc::new(MemoryQueue::new()),
        catalog,
    ))
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub queue: Arc<MemoryQueue>,
    pub catalog: Arc<RecordingCatalog>,
    pub updates: mpsc::UnboundedReceiver<(String, HealthStatus)>,
    pub scheduler: Arc<HealthCheckScheduler>,
}

pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let (catalog, updates) = RecordingCatalog::new();
    let scheduler = Arc::new(HealthCheckScheduler::new(
        store.clone(),
        Arc::new(Registry::with_builtins()),
        queue.clone(),
        catalog.clone(),
    ));

    Harness {
        store,
        queue,
        catalog,
        updates,
        scheduler,
    }
}

pub fn http_configuration(id: &str, url: &str) -> CheckConfigurationRow {
    CheckConfigurationRow {
        id: id.to_string(),
        name: format!("HTTP {id}"),
        strategy_id: "http".to_string(),
        config: VersionedConfig::new(2, json!({ "url": url, "timeout_ms": 2000 })),
        interval_secs: 60,
    }
}

pub fn tcp_configuration(id: &str, port: u16) -> CheckConfigurationRow {
    CheckConfigurationRow {
        id: id.to_string(),
        name: format!("TCP {id}"),
        strategy_id: "tcp".to_string(),
        config: VersionedConfig::new(1, json!({ "host": "127.0.0.1", "port": port, "timeout_ms": 1000 })),
        interval_secs: 60,
    }
}

pub async fn associate(
    store: &dyn ConfigStore,
    configuration: CheckConfigurationRow,
    system_id: &str,
    enabled: bool,
) {
    let config_id = configuration.id.clone();
    store.upsert_configuration(configuration).await.unwrap();
    store
        .upsert_association(SystemAssociationRow {
            system_id: system_id.to_string(),
            config_id,
            enabled,
        })
        .await
        .unwrap();
}

pub fn run_at(
    config_id: &str,
    system_id: &str,
    status: &str,
    latency_ms: Option<u64>,
    timestamp: DateTime<Utc>,
) -> RunRow {
    RunRow {
        config_id: config_id.to_string(),
        system_id: system_id.to_string(),
        status: status.to_string(),
        latency_ms,
        result: json!({ "status_code": 200, "content_length": 64 }),
        timestamp,
    }
}

/// A localhost port nothing is listening on
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}
