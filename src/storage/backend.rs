//! Configuration store trait definition
//!
//! This module defines the `ConfigStore` trait that all storage
//! implementations must implement. The scheduler, the rollup worker and the
//! query path only ever talk to storage through this trait.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use super::schema::{
    AggregateRow, AggregateTier, CheckConfigurationRow, RunRow, SystemAssociationRow,
};

/// An enabled association joined with its configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EnabledCheck {
    pub system_id: String,
    pub configuration: CheckConfigurationRow,
}

/// Health of the storage backend itself
#[derive(Debug, Clone)]
pub struct BackendHealth {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Trait for configuration and run-history storage
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`; a single instance is shared as
/// `Arc<dyn ConfigStore>` across all jobs.
///
/// ## Ranges
///
/// All time ranges are half-open: `[start, end)`.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    // ========================================================================
    // Configurations and associations
    // ========================================================================

    /// Insert or replace a check configuration (keyed by id)
    async fn upsert_configuration(&self, configuration: CheckConfigurationRow) -> StorageResult<()>;

    /// Insert or replace a system association (keyed by system and config id)
    ///
    /// Fails with `StorageError::NotFound` if the configuration does not exist.
    async fn upsert_association(&self, association: SystemAssociationRow) -> StorageResult<()>;

    /// Delete an association. Returns whether it existed.
    async fn delete_association(&self, system_id: &str, config_id: &str) -> StorageResult<bool>;

    async fn list_associations(&self) -> StorageResult<Vec<SystemAssociationRow>>;

    async fn find_configuration(&self, config_id: &str) -> StorageResult<Option<CheckConfigurationRow>>;

    /// All enabled associations with their configurations
    async fn enabled_checks(&self) -> StorageResult<Vec<EnabledCheck>>;

    /// The configuration for an association, only if the association is enabled
    async fn find_enabled_check(
        &self,
        config_id: &str,
        system_id: &str,
    ) -> StorageResult<Option<CheckConfigurationRow>>;

    /// Configurations enabled for a system
    async fn enabled_checks_for_system(&self, system_id: &str) -> StorageResult<Vec<CheckConfigurationRow>>;

    // ========================================================================
    // Raw runs
    // ========================================================================

    async fn insert_run(&self, run: RunRow) -> StorageResult<()>;

    /// Most recent run of a check for a system
    async fn latest_run(&self, config_id: &str, system_id: &str) -> StorageResult<Option<RunRow>>;

    /// Runs with `start <= timestamp < end`, oldest first
    async fn runs_in_range(
        &self,
        config_id: &str,
        system_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<RunRow>>;

    /// Delete runs older than `before`. Returns the number deleted.
    async fn delete_runs_before(&self, before: DateTime<Utc>) -> StorageResult<usize>;

    // ========================================================================
    // Rolled-up buckets
    // ========================================================================

    /// Insert or replace an aggregate row (keyed by config, system, tier and bucket start)
    async fn upsert_aggregate(&self, row: AggregateRow) -> StorageResult<()>;

    /// Aggregate rows of a tier whose bucket overlaps `[start, end)`, oldest first
    async fn aggregates_in_range(
        &self,
        config_id: &str,
        system_id: &str,
        tier: AggregateTier,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<AggregateRow>>;

    /// Delete aggregate rows of a tier starting before `before`. Returns the number deleted.
    async fn delete_aggregates_before(
        &self,
        tier: AggregateTier,
        before: DateTime<Utc>,
    ) -> StorageResult<usize>;

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Lightweight check that the backend is operational
    async fn health_check(&self) -> StorageResult<BackendHealth>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
