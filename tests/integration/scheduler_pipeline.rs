//! Integration tests for the scheduler and job executor
//!
//! These tests verify that:
//! - Bootstrap applies delta-corrected start delays and cancels orphans
//! - Execution stores runs and propagates the reduced system status
//! - Probe failures become unhealthy runs
//! - Only malformed payloads fail a job
//! - Store and catalog failures are logged, never fatal

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::Utc;
use healthwatch::HealthStatus;
use healthwatch::queue::{JobQueue, RecurringJobOptions};
use healthwatch::scheduler::{JobError, JobState, job_id};
use healthwatch::storage::{ConfigStore, MemoryStore};
use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{
    FailingCatalog, FaultyStore, RecordingCatalog, associate, closed_port, harness, http_configuration,
    run_at, scheduler_with, tcp_configuration,
};

#[tokio::test]
async fn test_bootstrap_uses_time_since_last_run() {
    let h = harness();
    let now = Utc::now();

    associate(h.store.as_ref(), http_configuration("recent", "http://127.0.0.1:9"), "sys", true).await;
    associate(h.store.as_ref(), http_configuration("stale", "http://127.0.0.1:9"), "sys", true).await;
    associate(h.store.as_ref(), http_configuration("fresh", "http://127.0.0.1:9"), "sys", true).await;
    associate(h.store.as_ref(), http_configuration("off", "http://127.0.0.1:9"), "sys", false).await;

    h.store
        .insert_run(run_at("recent", "sys", "healthy", Some(5), now - chrono::Duration::seconds(40)))
        .await
        .unwrap();
    h.store
        .insert_run(run_at("stale", "sys", "healthy", Some(5), now - chrono::Duration::seconds(90)))
        .await
        .unwrap();

    let report = h.scheduler.bootstrap_at(now).await.unwrap();
    assert_eq!(report.scheduled, 3);
    assert_eq!(report.orphans_cancelled, 0);

    let delays: Vec<(String, u64)> = h
        .queue
        .list_recurring_jobs()
        .await
        .unwrap()
        .into_iter()
        .map(|job| (job.job_id, job.start_delay_secs))
        .collect();

    assert_eq!(
        delays,
        vec![
            ("healthcheck:fresh:sys".to_string(), 0),
            ("healthcheck:recent:sys".to_string(), 20),
            ("healthcheck:stale:sys".to_string(), 0),
        ]
    );
    assert_eq!(h.scheduler.job_state("recent", "sys").await, JobState::Scheduled);
    assert_eq!(h.scheduler.job_state("off", "sys").await, JobState::Unscheduled);
}

#[tokio::test]
async fn test_bootstrap_cancels_orphans_only_with_prefix() {
    let h = harness();
    associate(h.store.as_ref(), http_configuration("web", "http://127.0.0.1:9"), "sys", true).await;

    for id in ["healthcheck:deleted:sys", "reports:nightly"] {
        h.queue
            .schedule_recurring(
                json!({}),
                RecurringJobOptions {
                    job_id: id.to_string(),
                    interval_secs: 3600,
                    start_delay_secs: 3600,
                },
            )
            .await
            .unwrap();
    }

    let report = h.scheduler.bootstrap().await.unwrap();
    assert_eq!(report.scheduled, 1);
    assert_eq!(report.orphans_cancelled, 1);

    let ids: Vec<String> = h
        .queue
        .list_recurring_jobs()
        .await
        .unwrap()
        .into_iter()
        .map(|job| job.job_id)
        .collect();
    assert_eq!(ids, vec!["healthcheck:web:sys".to_string(), "reports:nightly".to_string()]);
    assert_eq!(h.scheduler.job_state("deleted", "sys").await, JobState::Removed);
}

#[tokio::test]
async fn test_probe_failure_stores_unhealthy_run_and_propagates() {
    let h = harness();
    let port = closed_port().await;
    associate(h.store.as_ref(), tcp_configuration("db", port), "shop", true).await;

    h.scheduler
        .execute_job(&json!({"config_id": "db", "system_id": "shop"}))
        .await
        .unwrap();

    let run = h.store.latest_run("db", "shop").await.unwrap().unwrap();
    assert_eq!(run.status, "unhealthy");
    assert_eq!(run.latency_ms, None);
    assert!(run.result.get("error").is_some());

    assert_eq!(
        h.catalog.updates().await,
        vec![("shop".to_string(), HealthStatus::Unhealthy)]
    );
}

#[tokio::test]
async fn test_invalid_stored_config_stores_unhealthy_run() {
    let h = harness();
    associate(h.store.as_ref(), http_configuration("web", "ftp://example.com"), "shop", true).await;

    h.scheduler
        .execute_job(&json!({"config_id": "web", "system_id": "shop"}))
        .await
        .unwrap();

    let run = h.store.latest_run("web", "shop").await.unwrap().unwrap();
    assert_eq!(run.status, "unhealthy");
    assert_eq!(h.catalog.updates().await.len(), 1);
}

#[tokio::test]
async fn test_malformed_payload_fails_job() {
    let h = harness();
    let result = h.scheduler.execute_job(&json!({"config": 1})).await;
    assert_matches!(result, Err(JobError::MalformedPayload(_)));
}

#[tokio::test]
async fn test_disabled_or_unknown_association_is_skipped() {
    let h = harness();
    associate(h.store.as_ref(), http_configuration("web", "http://127.0.0.1:9"), "shop", false).await;

    h.scheduler
        .execute_job(&json!({"config_id": "web", "system_id": "shop"}))
        .await
        .unwrap();
    h.scheduler
        .execute_job(&json!({"config_id": "missing", "system_id": "shop"}))
        .await
        .unwrap();

    assert!(h.store.latest_run("web", "shop").await.unwrap().is_none());
    assert!(h.catalog.updates().await.is_empty());
}

#[tokio::test]
async fn test_unknown_strategy_skips_run() {
    let h = harness();
    let mut configuration = http_configuration("legacy", "http://127.0.0.1:9");
    configuration.strategy_id = "ftp".to_string();
    associate(h.store.as_ref(), configuration, "shop", true).await;

    h.scheduler
        .execute_job(&json!({"config_id": "legacy", "system_id": "shop"}))
        .await
        .unwrap();

    assert!(h.store.latest_run("legacy", "shop").await.unwrap().is_none());
    assert!(h.catalog.updates().await.is_empty());
}

#[tokio::test]
async fn test_system_status_reduces_over_all_checks() {
    let h = harness();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    associate(h.store.as_ref(), http_configuration("web", &server.uri()), "shop", true).await;
    associate(h.store.as_ref(), http_configuration("api", &server.uri()), "shop", true).await;
    h.store
        .insert_run(run_at("api", "shop", "degraded", Some(10), Utc::now()))
        .await
        .unwrap();

    h.scheduler
        .execute_job(&json!({"config_id": "web", "system_id": "shop"}))
        .await
        .unwrap();

    let web = h.store.latest_run("web", "shop").await.unwrap().unwrap();
    assert_eq!(web.status, "healthy");
    assert_eq!(
        h.catalog.updates().await,
        vec![("shop".to_string(), HealthStatus::Degraded)]
    );
}

#[tokio::test]
async fn test_consumer_executes_scheduled_association() {
    let mut h = harness();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let configuration = http_configuration("web", &server.uri());
    associate(h.store.as_ref(), configuration.clone(), "shop", true).await;

    h.scheduler.start_consumer().await.unwrap();
    h.scheduler
        .schedule_association(&configuration, "shop")
        .await
        .unwrap();

    let update = tokio::time::timeout(Duration::from_secs(5), h.updates.recv())
        .await
        .expect("catalog update within 5s")
        .unwrap();
    assert_eq!(update, ("shop".to_string(), HealthStatus::Healthy));

    assert!(h.scheduler.unschedule_association("web", "shop").await.unwrap());
    assert_eq!(h.scheduler.job_state("web", "shop").await, JobState::Removed);
    assert!(
        !h.queue
            .list_recurring_jobs()
            .await
            .unwrap()
            .iter()
            .any(|job| job.job_id == job_id("web", "shop"))
    );
}

#[tokio::test]
async fn test_catalog_failure_keeps_run_and_succeeds() {
    let store = Arc::new(MemoryStore::new());
    let catalog = Arc::new(FailingCatalog::default());
    let scheduler = scheduler_with(store.clone(), catalog.clone());

    let port = closed_port().await;
    associate(store.as_ref(), tcp_configuration("db", port), "shop", true).await;

    let result = scheduler
        .execute_job(&json!({"config_id": "db", "system_id": "shop"}))
        .await;

    assert_matches!(result, Ok(()));
    assert_eq!(catalog.attempts(), 1);
    let run = store.latest_run("db", "shop").await.unwrap().unwrap();
    assert_eq!(run.status, "unhealthy");
}

#[tokio::test]
async fn test_run_write_failure_still_propagates() {
    let store = Arc::new(FaultyStore::new());
    let (catalog, _updates) = RecordingCatalog::new();
    let scheduler = scheduler_with(store.clone(), catalog.clone());

    let port = closed_port().await;
    associate(&store.inner, tcp_configuration("db", port), "shop", true).await;
    let earlier = run_at("db", "shop", "degraded", Some(80), Utc::now() - chrono::Duration::minutes(1));
    store.inner.insert_run(earlier.clone()).await.unwrap();

    store.fail_run_writes.store(true, Ordering::SeqCst);
    let result = scheduler
        .execute_job(&json!({"config_id": "db", "system_id": "shop"}))
        .await;

    assert_matches!(result, Ok(()));
    // The failed probe was never stored, so the earlier run still decides the status
    assert_eq!(store.inner.latest_run("db", "shop").await.unwrap(), Some(earlier));
    assert_eq!(
        catalog.updates().await,
        vec![("shop".to_string(), HealthStatus::Degraded)]
    );
}

#[tokio::test]
async fn test_check_lookup_failure_skips_run() {
    let store = Arc::new(FaultyStore::new());
    let (catalog, _updates) = RecordingCatalog::new();
    let scheduler = scheduler_with(store.clone(), catalog.clone());

    associate(&store.inner, http_configuration("web", "http://127.0.0.1:9"), "shop", true).await;
    store.fail_check_lookups.store(true, Ordering::SeqCst);

    let result = scheduler
        .execute_job(&json!({"config_id": "web", "system_id": "shop"}))
        .await;

    assert_matches!(result, Ok(()));
    assert_eq!(store.inner.latest_run("web", "shop").await.unwrap(), None);
    assert!(catalog.updates().await.is_empty());
    assert_ne!(scheduler.job_state("web", "shop").await, JobState::Executing);
}
