use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, trace, warn};

use crate::api::ApiConfig;
use crate::checks::config::VersionedConfig;
use crate::registry::Registry;
use crate::rollup::RollupConfig;
use crate::scheduler::{HttpCatalog, NullCatalog, SystemCatalog};
use crate::storage::{
    CheckConfigurationRow, ConfigStore, MemoryStore, StorageError, StorageResult,
    SystemAssociationRow,
};

/// Storage backend configuration
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./healthwatch.db")
}

impl StorageConfig {
    /// Open the configured backend
    pub async fn open(&self) -> StorageResult<Arc<dyn ConfigStore>> {
        match self {
            StorageConfig::None => {
                info!("using in-memory storage, history is lost on restart");
                Ok(Arc::new(MemoryStore::new()))
            }
            #[cfg(feature = "storage-sqlite")]
            StorageConfig::Sqlite { path } => {
                let store = crate::storage::sqlite::SqliteStore::new(path).await?;
                Ok(Arc::new(store))
            }
            #[cfg(not(feature = "storage-sqlite"))]
            StorageConfig::Sqlite { .. } => Err(StorageError::ConnectionFailed(
                "built without the storage-sqlite feature".to_string(),
            )),
        }
    }
}

/// Where derived system statuses are pushed
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct CatalogConfig {
    pub url: String,
    pub token: Option<String>,
    #[serde(default = "default_catalog_timeout")]
    pub timeout_secs: u64,
}

fn default_catalog_timeout() -> u64 {
    10
}

/// A check configuration declared in the config file
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct CheckConfig {
    pub id: String,
    pub name: String,
    pub strategy: String,
    #[serde(default = "default_interval")]
    pub interval: u64,
    pub config: VersionedConfig,
}

fn default_interval() -> u64 {
    60
}

/// A system and the checks enabled for it
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct SystemConfig {
    pub id: String,
    #[serde(default)]
    pub checks: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    /// Storage configuration (optional - defaults to SQLite)
    pub storage: Option<StorageConfig>,

    /// Read API (optional - disabled when absent)
    pub api: Option<ApiConfig>,

    /// System catalog (optional - statuses are only logged when absent)
    pub catalog: Option<CatalogConfig>,

    #[serde(default)]
    pub rollup: RollupConfig,

    #[serde(default)]
    pub checks: Vec<CheckConfig>,

    #[serde(default)]
    pub systems: Vec<SystemConfig>,
}

impl Config {
    pub fn catalog(&self) -> anyhow::Result<Arc<dyn SystemCatalog>> {
        match &self.catalog {
            Some(catalog) => Ok(Arc::new(HttpCatalog::new(
                catalog.url.clone(),
                catalog.token.clone(),
                Duration::from_secs(catalog.timeout_secs),
            )?)),
            None => Ok(Arc::new(NullCatalog)),
        }
    }

    /// Upsert the declared checks and system associations into `store`.
    ///
    /// Checks whose strategy is unknown or whose config does not validate are
    /// logged and skipped, as are associations referring to them.
    pub async fn seed_store(&self, store: &dyn ConfigStore, registry: &Registry) -> StorageResult<usize> {
        let mut seeded = Vec::with_capacity(self.checks.len());

        for check in &self.checks {
            let Some(strategy) = registry.strategy(&check.strategy) else {
                warn!(check = %check.id, strategy = %check.strategy, "unknown strategy, skipping check");
                continue;
            };
            if let Err(e) = strategy.validate_config(&check.config) {
                warn!(check = %check.id, error = %e, "invalid check configuration, skipping");
                continue;
            }

            store
                .upsert_configuration(CheckConfigurationRow {
                    id: check.id.clone(),
                    name: check.name.clone(),
                    strategy_id: check.strategy.clone(),
                    config: check.config.clone(),
                    interval_secs: check.interval,
                })
                .await?;
            seeded.push(check.id.as_str());
        }

        let mut associations = 0;
        for system in &self.systems {
            for config_id in &system.checks {
                if !seeded.contains(&config_id.as_str()) {
                    warn!(system = %system.id, check = %config_id, "system refers to an unknown check");
                    continue;
                }
                match store
                    .upsert_association(SystemAssociationRow {
                        system_id: system.id.clone(),
                        config_id: config_id.clone(),
                        enabled: system.enabled,
                    })
                    .await
                {
                    Ok(()) => associations += 1,
                    Err(StorageError::NotFound(msg)) => warn!("skipping association: {msg}"),
                    Err(e) => return Err(e),
                }
            }
        }

        info!(checks = seeded.len(), associations, "configuration seeded");
        Ok(associations)
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
