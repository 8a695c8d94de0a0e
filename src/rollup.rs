// Background worker: roll raw runs → hourly rows, then hourly → daily rows, then prune.
// Every pass recomputes all completed buckets still backed by the finer tier, so
// re-running a pass over the same data writes identical rows.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::buckets::{normalize_aggregate, raw_runs_to_buckets, reaggregate_buckets};
use crate::registry::Registry;
use crate::storage::{AggregateTier, CheckConfigurationRow, ConfigStore, StorageResult};
use crate::util::{MS_PER_DAY, MS_PER_HOUR, floor_to_day, floor_to_hour};

/// Config for the rollup worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollupConfig {
    pub interval_secs: u64,
    pub raw_retention_hours: u32,
    pub hourly_retention_days: u32,
    pub daily_retention_days: u32,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            raw_retention_hours: 48,
            hourly_retention_days: 30,
            daily_retention_days: 365,
        }
    }
}

/// What one rollup pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollupReport {
    pub hourly_rows: usize,
    pub daily_rows: usize,
    pub runs_pruned: usize,
    pub hourly_pruned: usize,
    pub daily_pruned: usize,
}

/// Spawns the rollup worker. Returns a join handle.
pub fn spawn(
    store: Arc<dyn ConfigStore>,
    registry: Arc<Registry>,
    config: RollupConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run(store, registry, config).await;
    })
}

#[instrument(skip(store, registry), fields(interval_secs = config.interval_secs))]
async fn run(store: Arc<dyn ConfigStore>, registry: Arc<Registry>, config: RollupConfig) {
    let mut ticker = tokio::time::interval(Duration::from_secs(config.interval_secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if let Err(e) = run_once(store.as_ref(), &registry, &config, Utc::now()).await {
            warn!(error = %e, "rollup tick failed");
        }
    }
}

/// Runs one rollup pass (raw→hourly, hourly→daily, prune) as of `now`.
pub async fn run_once(
    store: &dyn ConfigStore,
    registry: &Registry,
    config: &RollupConfig,
    now: DateTime<Utc>,
) -> StorageResult<RollupReport> {
    // Cutoffs are aligned to their tier so the oldest retained bucket is never partially pruned.
    let raw_cutoff = floor_to_hour(now - chrono::Duration::hours(config.raw_retention_hours.into()));
    let hourly_cutoff = floor_to_day(now - chrono::Duration::days(config.hourly_retention_days.into()));
    let daily_cutoff = floor_to_day(now - chrono::Duration::days(config.daily_retention_days.into()));

    let mut report = RollupReport::default();

    for association in store.list_associations().await? {
        let Some(configuration) = store.find_configuration(&association.config_id).await? else {
            continue;
        };

        report.hourly_rows += roll_up_hourly(
            store,
            registry,
            &configuration,
            &association.system_id,
            raw_cutoff,
            floor_to_hour(now),
        )
        .await?;

        report.daily_rows += roll_up_daily(
            store,
            registry,
            &configuration,
            &association.system_id,
            hourly_cutoff,
            floor_to_day(now),
        )
        .await?;
    }

    report.runs_pruned = store.delete_runs_before(raw_cutoff).await?;
    report.hourly_pruned = store
        .delete_aggregates_before(AggregateTier::Hourly, hourly_cutoff)
        .await?;
    report.daily_pruned = store
        .delete_aggregates_before(AggregateTier::Daily, daily_cutoff)
        .await?;

    if report.hourly_rows > 0 || report.daily_rows > 0 {
        info!(
            hourly_rows = report.hourly_rows,
            daily_rows = report.daily_rows,
            runs_pruned = report.runs_pruned,
            "rollup pass complete"
        );
    }

    Ok(report)
}

/// Raw runs of completed hours in `[start, end)` → hourly rows
async fn roll_up_hourly(
    store: &dyn ConfigStore,
    registry: &Registry,
    configuration: &CheckConfigurationRow,
    system_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> StorageResult<usize> {
    if start >= end {
        return Ok(0);
    }

    let runs = store
        .runs_in_range(&configuration.id, system_id, start, end)
        .await?;

    let buckets = raw_runs_to_buckets(
        registry,
        &configuration.strategy_id,
        &runs,
        start.timestamp_millis(),
        MS_PER_HOUR,
    );

    for bucket in &buckets {
        store
            .upsert_aggregate(bucket.to_aggregate_row(&configuration.id, system_id, AggregateTier::Hourly))
            .await?;
    }

    debug!(config_id = %configuration.id, system_id, rows = buckets.len(), "raw -> hourly");
    Ok(buckets.len())
}

/// Hourly rows of completed days in `[start, end)` → daily rows
async fn roll_up_daily(
    store: &dyn ConfigStore,
    registry: &Registry,
    configuration: &CheckConfigurationRow,
    system_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> StorageResult<usize> {
    if start >= end {
        return Ok(0);
    }

    let hourly: Vec<_> = store
        .aggregates_in_range(&configuration.id, system_id, AggregateTier::Hourly, start, end)
        .await?
        .iter()
        .map(normalize_aggregate)
        .collect();

    let daily = reaggregate_buckets(
        registry,
        &configuration.strategy_id,
        &hourly,
        MS_PER_DAY,
        start,
        end,
    );

    for bucket in &daily {
        store
            .upsert_aggregate(bucket.to_aggregate_row(&configuration.id, system_id, AggregateTier::Daily))
            .await?;
    }

    debug!(config_id = %configuration.id, system_id, rows = daily.len(), "hourly -> daily");
    Ok(daily.len())
}
