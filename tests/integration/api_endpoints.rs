//! Integration tests for the REST API
//!
//! Requests go through the full router (auth, tracing and CORS layers) with
//! an in-memory store behind it.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use healthwatch::api::{ApiConfig, ApiState, build_router};
use healthwatch::registry::Registry;
use healthwatch::storage::{ConfigStore, MemoryStore};
use healthwatch::util::{MS_PER_DAY, MS_PER_HOUR, MS_PER_MINUTE, millis_to_datetime};
use serde_json::Value;
use tower::ServiceExt;

use crate::helpers::{associate, http_configuration, run_at};

const BASE: i64 = 20_000 * MS_PER_DAY;
const TOKEN: &str = "s3cret";

async fn app(auth_token: Option<&str>) -> Router {
    let store = Arc::new(MemoryStore::new());
    associate(store.as_ref(), http_configuration("web", "http://localhost"), "shop", true).await;
    associate(store.as_ref(), http_configuration("api", "http://localhost"), "shop", true).await;

    for (minute, status, latency) in [(5, "healthy", 10), (10, "healthy", 30), (70, "unhealthy", 50)] {
        store
            .insert_run(run_at(
                "web",
                "shop",
                status,
                Some(latency),
                millis_to_datetime(BASE + minute * MS_PER_MINUTE),
            ))
            .await
            .unwrap();
    }
    store
        .insert_run(run_at("api", "shop", "degraded", Some(5), millis_to_datetime(BASE)))
        .await
        .unwrap();

    let config = ApiConfig {
        auth_token: auth_token.map(str::to_string),
        ..ApiConfig::default()
    };
    build_router(&config, ApiState::new(store, Arc::new(Registry::with_builtins())))
}

async fn get(app: Router, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder().uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    let response = app
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn history_uri(config_id: &str, start_ms: i64, end_ms: i64, interval_secs: u64) -> String {
    format!(
        "/api/v1/checks/{config_id}/systems/shop/history?start={}&end={}&interval_secs={interval_secs}",
        millis_to_datetime(start_ms).format("%Y-%m-%dT%H:%M:%SZ"),
        millis_to_datetime(end_ms).format("%Y-%m-%dT%H:%M:%SZ"),
    )
}

#[tokio::test]
async fn test_health_endpoint() {
    let (status, body) = get(app(None).await, "/api/v1/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage_healthy"], true);
}

#[tokio::test]
async fn test_history_endpoint_buckets_runs() {
    let uri = history_uri("web", BASE, BASE + 2 * MS_PER_HOUR, 3600);
    let (status, body) = get(app(None).await, &uri, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["config_id"], "web");
    assert_eq!(body["interval_secs"], 3600);

    let buckets = body["buckets"].as_array().unwrap();
    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[0]["run_count"], 2);
    assert_eq!(buckets[0]["avg_latency_ms"], 20);
    assert_eq!(buckets[0]["source_tier"], "raw");
    assert_eq!(buckets[1]["unhealthy_count"], 1);
}

#[tokio::test]
async fn test_history_endpoint_errors() {
    let inverted = history_uri("web", BASE + MS_PER_HOUR, BASE, 3600);
    let (status, body) = get(app(None).await, &inverted, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("invalid history range"));

    let unknown = history_uri("nope", BASE, BASE + MS_PER_HOUR, 3600);
    let (status, _) = get(app(None).await, &unknown, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_system_status_endpoint() {
    let (status, body) = get(app(None).await, "/api/v1/systems/shop/status", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["system_id"], "shop");
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["checks"].as_array().unwrap().len(), 2);

    let (status, body) = get(app(None).await, "/api/v1/systems/ghost/status", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_auth_protects_everything_but_health() {
    let (status, _) = get(app(Some(TOKEN)).await, "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(app(Some(TOKEN)).await, "/api/v1/systems/shop/status", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = get(app(Some(TOKEN)).await, "/api/v1/systems/shop/status", Some("wrong")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = get(app(Some(TOKEN)).await, "/api/v1/systems/shop/status", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
}
