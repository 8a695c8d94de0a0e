//! Integration tests for the SQLite store
//!
//! These tests verify that:
//! - Configurations, associations and runs survive a reopen
//! - Aggregate reads use bucket overlap, not bucket start
//! - Pruning removes only rows older than the cutoff

use assert_matches::assert_matches;
use healthwatch::aggregate::{AggregateState, AggregatedResult, FieldMap};
use healthwatch::storage::sqlite::SqliteStore;
use healthwatch::storage::{
    AggregateRow, AggregateTier, ConfigStore, StorageError, SystemAssociationRow,
};
use healthwatch::util::{MS_PER_DAY, MS_PER_HOUR, MS_PER_MINUTE, millis_to_datetime};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::helpers::{associate, http_configuration, run_at};

const BASE: i64 = 20_000 * MS_PER_DAY;

fn hourly_row(bucket_start_ms: i64, run_count: u64) -> AggregateRow {
    AggregateRow {
        config_id: "web".to_string(),
        system_id: "shop".to_string(),
        tier: AggregateTier::Hourly,
        bucket_start: millis_to_datetime(bucket_start_ms),
        run_count,
        healthy_count: run_count,
        degraded_count: 0,
        unhealthy_count: 0,
        latency_count: run_count,
        latency_sum_ms: Some(run_count * 10),
        min_latency_ms: Some(10),
        max_latency_ms: Some(10),
        p95_latency_ms: Some(10),
        aggregated_result: Some(AggregatedResult::from_fields(FieldMap::from([(
            "checks".to_string(),
            AggregateState::counter(run_count),
        )]))),
    }
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("healthwatch.db");

    {
        let store = SqliteStore::new(&db_path).await.unwrap();
        associate(&store, http_configuration("web", "http://localhost"), "shop", true).await;
        associate(&store, http_configuration("api", "http://localhost"), "shop", false).await;
        store
            .insert_run(run_at("web", "shop", "healthy", Some(12), millis_to_datetime(BASE)))
            .await
            .unwrap();
        store
            .insert_run(run_at("web", "shop", "degraded", None, millis_to_datetime(BASE + MS_PER_MINUTE)))
            .await
            .unwrap();
        store.upsert_aggregate(hourly_row(BASE, 2)).await.unwrap();
        store.close().await.unwrap();
    }

    let store = SqliteStore::new(&db_path).await.unwrap();

    let enabled = store.enabled_checks().await.unwrap();
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].configuration, http_configuration("web", "http://localhost"));
    assert_eq!(store.list_associations().await.unwrap().len(), 2);
    assert!(store.find_enabled_check("api", "shop").await.unwrap().is_none());

    let latest = store.latest_run("web", "shop").await.unwrap().unwrap();
    assert_eq!(latest.status, "degraded");
    assert_eq!(latest.latency_ms, None);
    assert_eq!(latest.timestamp, millis_to_datetime(BASE + MS_PER_MINUTE));

    let rows = store
        .aggregates_in_range(
            "web",
            "shop",
            AggregateTier::Hourly,
            millis_to_datetime(BASE),
            millis_to_datetime(BASE + MS_PER_HOUR),
        )
        .await
        .unwrap();
    assert_eq!(rows, vec![hourly_row(BASE, 2)]);
}

#[tokio::test]
async fn test_association_requires_configuration() {
    let temp_dir = tempdir().unwrap();
    let store = SqliteStore::new(temp_dir.path().join("healthwatch.db")).await.unwrap();

    let result = store
        .upsert_association(SystemAssociationRow {
            system_id: "shop".to_string(),
            config_id: "missing".to_string(),
            enabled: true,
        })
        .await;
    assert_matches!(result, Err(StorageError::NotFound(_)));
}

#[tokio::test]
async fn test_upserts_replace_rows() {
    let temp_dir = tempdir().unwrap();
    let store = SqliteStore::new(temp_dir.path().join("healthwatch.db")).await.unwrap();

    associate(&store, http_configuration("web", "http://localhost"), "shop", true).await;
    let mut renamed = http_configuration("web", "http://localhost");
    renamed.interval_secs = 300;
    associate(&store, renamed.clone(), "shop", false).await;

    assert_eq!(store.find_configuration("web").await.unwrap(), Some(renamed));
    assert!(store.enabled_checks().await.unwrap().is_empty());

    store.upsert_aggregate(hourly_row(BASE, 2)).await.unwrap();
    store.upsert_aggregate(hourly_row(BASE, 5)).await.unwrap();
    let rows = store
        .aggregates_in_range(
            "web",
            "shop",
            AggregateTier::Hourly,
            millis_to_datetime(BASE),
            millis_to_datetime(BASE + MS_PER_HOUR),
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].run_count, 5);

    assert!(store.delete_association("shop", "web").await.unwrap());
    assert!(!store.delete_association("shop", "web").await.unwrap());
}

#[tokio::test]
async fn test_aggregates_in_range_uses_overlap() {
    let temp_dir = tempdir().unwrap();
    let store = SqliteStore::new(temp_dir.path().join("healthwatch.db")).await.unwrap();

    for hour in 0..4 {
        store
            .upsert_aggregate(hourly_row(BASE + hour * MS_PER_HOUR, 1))
            .await
            .unwrap();
    }

    // starts mid-way through the second bucket
    let rows = store
        .aggregates_in_range(
            "web",
            "shop",
            AggregateTier::Hourly,
            millis_to_datetime(BASE + MS_PER_HOUR + 30 * MS_PER_MINUTE),
            millis_to_datetime(BASE + 3 * MS_PER_HOUR),
        )
        .await
        .unwrap();

    let starts: Vec<_> = rows.iter().map(|r| r.bucket_start).collect();
    assert_eq!(
        starts,
        vec![
            millis_to_datetime(BASE + MS_PER_HOUR),
            millis_to_datetime(BASE + 2 * MS_PER_HOUR),
        ]
    );

    let daily = store
        .aggregates_in_range(
            "web",
            "shop",
            AggregateTier::Daily,
            millis_to_datetime(BASE),
            millis_to_datetime(BASE + MS_PER_DAY),
        )
        .await
        .unwrap();
    assert!(daily.is_empty());
}

#[tokio::test]
async fn test_pruning() {
    let temp_dir = tempdir().unwrap();
    let store = SqliteStore::new(temp_dir.path().join("healthwatch.db")).await.unwrap();

    for minute in 0..3 {
        store
            .insert_run(run_at(
                "web",
                "shop",
                "healthy",
                Some(10),
                millis_to_datetime(BASE + minute * MS_PER_MINUTE),
            ))
            .await
            .unwrap();
    }
    store.upsert_aggregate(hourly_row(BASE, 3)).await.unwrap();
    store.upsert_aggregate(hourly_row(BASE + MS_PER_HOUR, 3)).await.unwrap();

    let pruned = store
        .delete_runs_before(millis_to_datetime(BASE + 2 * MS_PER_MINUTE))
        .await
        .unwrap();
    assert_eq!(pruned, 2);

    let remaining = store
        .runs_in_range(
            "web",
            "shop",
            millis_to_datetime(BASE),
            millis_to_datetime(BASE + MS_PER_HOUR),
        )
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);

    let pruned = store
        .delete_aggregates_before(AggregateTier::Hourly, millis_to_datetime(BASE + MS_PER_HOUR))
        .await
        .unwrap();
    assert_eq!(pruned, 1);

    let health = store.health_check().await.unwrap();
    assert!(health.healthy);
}
