//! Persistence for check configurations, associations and run history
//!
//! Everything the scheduler, the rollup worker and the API read or write goes
//! through [`ConfigStore`]. Rows come in three tiers: raw runs, hourly
//! aggregates and daily aggregates, each keyed by (config, system, time).
//!
//! `SqliteStore` is the durable backend (feature `storage-sqlite`);
//! `MemoryStore` keeps everything in process and backs the tests and
//! `"backend": "none"` hubs.
//!
//! ## Usage
//!
//! ```no_run
//! use healthwatch::storage::{ConfigStore, sqlite::SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SqliteStore::new("./healthwatch.db").await?;
//!     let checks = store.enabled_checks().await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{BackendHealth, ConfigStore, EnabledCheck};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use schema::{AggregateRow, AggregateTier, CheckConfigurationRow, RunRow, SystemAssociationRow};
