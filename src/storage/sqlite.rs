//! SQLite storage backend implementation
//!
//! This module provides a SQLite-based implementation of the `ConfigStore` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Timestamps are stored as Unix milliseconds; run results, aggregated
//! results and check configurations as JSON text.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};

use super::backend::{BackendHealth, ConfigStore, EnabledCheck};
use super::error::{StorageError, StorageResult};
use super::schema::{
    AggregateRow, AggregateTier, CheckConfigurationRow, RunRow, SystemAssociationRow,
};
use crate::util::millis_to_datetime;

/// SQLite storage backend
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteStore {
    /// Create a new SQLite store
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create tables
    /// 3. Configure SQLite for WAL mode
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use healthwatch::storage::sqlite::SqliteStore;
    /// # async fn example() -> anyhow::Result<()> {
    /// let store = SqliteStore::new("./healthwatch.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn row_to_configuration(row: &SqliteRow) -> StorageResult<CheckConfigurationRow> {
        let config: String = row.try_get("config")?;
        Ok(CheckConfigurationRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            strategy_id: row.try_get("strategy_id")?,
            config: serde_json::from_str(&config)?,
            interval_secs: row.try_get::<i64, _>("interval_secs")?.max(0) as u64,
        })
    }

    fn row_to_run(row: &SqliteRow) -> StorageResult<RunRow> {
        let result: String = row.try_get("result")?;
        Ok(RunRow {
            config_id: row.try_get("config_id")?,
            system_id: row.try_get("system_id")?,
            status: row.try_get("status")?,
            latency_ms: to_u64(row.try_get("latency_ms")?),
            result: serde_json::from_str(&result)?,
            timestamp: millis_to_datetime(row.try_get("timestamp")?),
        })
    }

    fn row_to_aggregate(row: &SqliteRow) -> StorageResult<AggregateRow> {
        let tier: String = row.try_get("tier")?;
        let tier = match tier.as_str() {
            "hourly" => AggregateTier::Hourly,
            "daily" => AggregateTier::Daily,
            other => {
                return Err(StorageError::SerializationError(format!(
                    "unknown aggregate tier '{other}'"
                )));
            }
        };

        let aggregated_result = row
            .try_get::<Option<String>, _>("aggregated_result")?
            .map(|json| serde_json::from_str(&json))
            .transpose()?;

        Ok(AggregateRow {
            config_id: row.try_get("config_id")?,
            system_id: row.try_get("system_id")?,
            tier,
            bucket_start: millis_to_datetime(row.try_get("bucket_start")?),
            run_count: row.try_get::<i64, _>("run_count")?.max(0) as u64,
            healthy_count: row.try_get::<i64, _>("healthy_count")?.max(0) as u64,
            degraded_count: row.try_get::<i64, _>("degraded_count")?.max(0) as u64,
            unhealthy_count: row.try_get::<i64, _>("unhealthy_count")?.max(0) as u64,
            latency_count: row.try_get::<i64, _>("latency_count")?.max(0) as u64,
            latency_sum_ms: to_u64(row.try_get("latency_sum_ms")?),
            min_latency_ms: to_u64(row.try_get("min_latency_ms")?),
            max_latency_ms: to_u64(row.try_get("max_latency_ms")?),
            p95_latency_ms: to_u64(row.try_get("p95_latency_ms")?),
            aggregated_result,
        })
    }
}

fn to_u64(value: Option<i64>) -> Option<u64> {
    value.map(|v| v.max(0) as u64)
}

fn to_i64(value: Option<u64>) -> Option<i64> {
    value.map(|v| v as i64)
}

#[async_trait]
impl ConfigStore for SqliteStore {
    #[instrument(skip(self, configuration), fields(config_id = %configuration.id))]
    async fn upsert_configuration(&self, configuration: CheckConfigurationRow) -> StorageResult<()> {
        let config_json = serde_json::to_string(&configuration.config)?;

        sqlx::query(
            r#"
            INSERT INTO check_configurations (id, name, strategy_id, config, interval_secs)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                strategy_id = excluded.strategy_id,
                config = excluded.config,
                interval_secs = excluded.interval_secs
            "#,
        )
        .bind(&configuration.id)
        .bind(&configuration.name)
        .bind(&configuration.strategy_id)
        .bind(config_json)
        .bind(configuration.interval_secs as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, association), fields(system_id = %association.system_id, config_id = %association.config_id))]
    async fn upsert_association(&self, association: SystemAssociationRow) -> StorageResult<()> {
        let exists = sqlx::query("SELECT 1 FROM check_configurations WHERE id = ?")
            .bind(&association.config_id)
            .fetch_optional(&self.pool)
            .await?
            .is_some();

        if !exists {
            return Err(StorageError::NotFound(format!(
                "check configuration '{}'",
                association.config_id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO system_associations (system_id, config_id, enabled)
            VALUES (?, ?, ?)
            ON CONFLICT (system_id, config_id) DO UPDATE SET enabled = excluded.enabled
            "#,
        )
        .bind(&association.system_id)
        .bind(&association.config_id)
        .bind(association.enabled)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_association(&self, system_id: &str, config_id: &str) -> StorageResult<bool> {
        let result =
            sqlx::query("DELETE FROM system_associations WHERE system_id = ? AND config_id = ?")
                .bind(system_id)
                .bind(config_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_associations(&self) -> StorageResult<Vec<SystemAssociationRow>> {
        let rows = sqlx::query(
            "SELECT system_id, config_id, enabled FROM system_associations ORDER BY system_id, config_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(SystemAssociationRow {
                    system_id: row.try_get("system_id")?,
                    config_id: row.try_get("config_id")?,
                    enabled: row.try_get("enabled")?,
                })
            })
            .collect()
    }

    async fn find_configuration(&self, config_id: &str) -> StorageResult<Option<CheckConfigurationRow>> {
        let row = sqlx::query(
            "SELECT id, name, strategy_id, config, interval_secs FROM check_configurations WHERE id = ?",
        )
        .bind(config_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_configuration).transpose()
    }

    async fn enabled_checks(&self) -> StorageResult<Vec<EnabledCheck>> {
        let rows = sqlx::query(
            r#"
            SELECT a.system_id, c.id, c.name, c.strategy_id, c.config, c.interval_secs
            FROM system_associations a
            JOIN check_configurations c ON c.id = a.config_id
            WHERE a.enabled = 1
            ORDER BY a.system_id, c.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(EnabledCheck {
                    system_id: row.try_get("system_id")?,
                    configuration: Self::row_to_configuration(row)?,
                })
            })
            .collect()
    }

    async fn find_enabled_check(
        &self,
        config_id: &str,
        system_id: &str,
    ) -> StorageResult<Option<CheckConfigurationRow>> {
        let row = sqlx::query(
            r#"
            SELECT c.id, c.name, c.strategy_id, c.config, c.interval_secs
            FROM system_associations a
            JOIN check_configurations c ON c.id = a.config_id
            WHERE a.config_id = ? AND a.system_id = ? AND a.enabled = 1
            "#,
        )
        .bind(config_id)
        .bind(system_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_configuration).transpose()
    }

    async fn enabled_checks_for_system(&self, system_id: &str) -> StorageResult<Vec<CheckConfigurationRow>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.name, c.strategy_id, c.config, c.interval_secs
            FROM system_associations a
            JOIN check_configurations c ON c.id = a.config_id
            WHERE a.system_id = ? AND a.enabled = 1
            ORDER BY c.id
            "#,
        )
        .bind(system_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_configuration).collect()
    }

    #[instrument(skip(self, run), fields(config_id = %run.config_id, system_id = %run.system_id))]
    async fn insert_run(&self, run: RunRow) -> StorageResult<()> {
        let result_json = serde_json::to_string(&run.result)?;

        sqlx::query(
            r#"
            INSERT INTO check_runs (config_id, system_id, status, latency_ms, result, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.config_id)
        .bind(&run.system_id)
        .bind(&run.status)
        .bind(to_i64(run.latency_ms))
        .bind(result_json)
        .bind(run.timestamp.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest_run(&self, config_id: &str, system_id: &str) -> StorageResult<Option<RunRow>> {
        let row = sqlx::query(
            r#"
            SELECT config_id, system_id, status, latency_ms, result, timestamp
            FROM check_runs
            WHERE config_id = ? AND system_id = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(config_id)
        .bind(system_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_run).transpose()
    }

    async fn runs_in_range(
        &self,
        config_id: &str,
        system_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<RunRow>> {
        let rows = sqlx::query(
            r#"
            SELECT config_id, system_id, status, latency_ms, result, timestamp
            FROM check_runs
            WHERE config_id = ? AND system_id = ? AND timestamp >= ? AND timestamp < ?
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(config_id)
        .bind(system_id)
        .bind(start.timestamp_millis())
        .bind(end.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        debug!("range query returned {} runs", rows.len());
        rows.iter().map(Self::row_to_run).collect()
    }

    #[instrument(skip(self))]
    async fn delete_runs_before(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let result = sqlx::query("DELETE FROM check_runs WHERE timestamp < ?")
            .bind(before.timestamp_millis())
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() as usize;
        info!("deleted {} runs older than {}", deleted, before);
        Ok(deleted)
    }

    #[instrument(skip(self, row), fields(tier = %row.tier, bucket_start = %row.bucket_start))]
    async fn upsert_aggregate(&self, row: AggregateRow) -> StorageResult<()> {
        let aggregated_json = row
            .aggregated_result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO check_aggregates (
                config_id, system_id, tier, bucket_start,
                run_count, healthy_count, degraded_count, unhealthy_count,
                latency_count, latency_sum_ms, min_latency_ms, max_latency_ms, p95_latency_ms,
                aggregated_result
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (config_id, system_id, tier, bucket_start) DO UPDATE SET
                run_count = excluded.run_count,
                healthy_count = excluded.healthy_count,
                degraded_count = excluded.degraded_count,
                unhealthy_count = excluded.unhealthy_count,
                latency_count = excluded.latency_count,
                latency_sum_ms = excluded.latency_sum_ms,
                min_latency_ms = excluded.min_latency_ms,
                max_latency_ms = excluded.max_latency_ms,
                p95_latency_ms = excluded.p95_latency_ms,
                aggregated_result = excluded.aggregated_result
            "#,
        )
        .bind(&row.config_id)
        .bind(&row.system_id)
        .bind(row.tier.as_str())
        .bind(row.bucket_start.timestamp_millis())
        .bind(row.run_count as i64)
        .bind(row.healthy_count as i64)
        .bind(row.degraded_count as i64)
        .bind(row.unhealthy_count as i64)
        .bind(row.latency_count as i64)
        .bind(to_i64(row.latency_sum_ms))
        .bind(to_i64(row.min_latency_ms))
        .bind(to_i64(row.max_latency_ms))
        .bind(to_i64(row.p95_latency_ms))
        .bind(aggregated_json)
        .execute(&self.pool)
        .await?;

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
        // A bucket overlaps [start, end) if it starts before `end` and ends after `start`.
        let rows = sqlx::query(
            r#"
            SELECT config_id, system_id, tier, bucket_start,
                   run_count, healthy_count, degraded_count, unhealthy_count,
                   latency_count, latency_sum_ms, min_latency_ms, max_latency_ms, p95_latency_ms,
                   aggregated_result
            FROM check_aggregates
            WHERE config_id = ? AND system_id = ? AND tier = ?
              AND bucket_start < ? AND bucket_start + ? > ?
            ORDER BY bucket_start ASC
            "#,
        )
        .bind(config_id)
        .bind(system_id)
        .bind(tier.as_str())
        .bind(end.timestamp_millis())
        .bind(tier.bucket_ms())
        .bind(start.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_aggregate).collect()
    }

    #[instrument(skip(self))]
    async fn delete_aggregates_before(
        &self,
        tier: AggregateTier,
        before: DateTime<Utc>,
    ) -> StorageResult<usize> {
        let result = sqlx::query("DELETE FROM check_aggregates WHERE tier = ? AND bucket_start < ?")
            .bind(tier.as_str())
            .bind(before.timestamp_millis())
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() as usize;
        info!("deleted {} {} aggregates older than {}", deleted, tier, before);
        Ok(deleted)
    }

    async fn health_check(&self) -> StorageResult<BackendHealth> {
        let run_count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM check_runs")
            .fetch_one(&self.pool)
            .await?
            .try_get("count")?;

        Ok(BackendHealth {
            healthy: true,
            message: "SQLite storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "sqlite".to_string()),
                ("path".to_string(), self.db_path.clone()),
                ("runs".to_string(), run_count.to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite store");
        self.pool.close().await;
        Ok(())
    }
}
