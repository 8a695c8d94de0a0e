//! HTTP strategy against a mock server

use std::time::Duration;

use healthwatch::HealthStatus;
use healthwatch::checks::config::VersionedConfig;
use healthwatch::checks::http::HttpStrategy;
use healthwatch::registry::HealthCheckStrategy;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn server_responding(status: u16, body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(&server)
        .await;
    server
}

fn config(server: &MockServer, extra: serde_json::Value) -> VersionedConfig {
    let mut data = json!({ "url": format!("{}/health", server.uri()), "timeout_ms": 2000 });
    if let (Some(target), Some(extra)) = (data.as_object_mut(), extra.as_object()) {
        for (key, value) in extra {
            target.insert(key.clone(), value.clone());
        }
    }
    VersionedConfig::new(2, data)
}

#[tokio::test]
async fn test_healthy_when_status_and_patterns_match() {
    let server = server_responding(200, r#"{"status":"ok","db":"up"}"#).await;
    let config = config(
        &server,
        json!({ "body_patterns": [
            { "name": "status_ok", "pattern": "\"status\":\"ok\"" },
            { "name": "db_up", "pattern": "db\":\"up" }
        ]}),
    );

    let outcome = HttpStrategy::new().execute(&config).await.unwrap();

    assert_eq!(outcome.status, HealthStatus::Healthy);
    assert_eq!(outcome.message, None);
    assert!(outcome.latency_ms.is_some());
    assert_eq!(outcome.result["status_code"], 200);
    assert_eq!(outcome.result["collectors"]["status_ok"]["matched"], true);
    assert_eq!(outcome.result["collectors"]["db_up"]["matched"], true);
}

#[tokio::test]
async fn test_degraded_when_pattern_misses() {
    let server = server_responding(200, "maintenance").await;
    let config = config(
        &server,
        json!({ "body_patterns": [{ "name": "status_ok", "pattern": "ok$" }] }),
    );

    let outcome = HttpStrategy::new().execute(&config).await.unwrap();

    assert_eq!(outcome.status, HealthStatus::Degraded);
    assert_eq!(outcome.result["collectors"]["status_ok"]["matched"], false);
    assert!(outcome.message.unwrap().contains("status_ok"));
}

#[tokio::test]
async fn test_unhealthy_on_unexpected_status() {
    let server = server_responding(503, "down").await;

    let outcome = HttpStrategy::new()
        .execute(&config(&server, json!({})))
        .await
        .unwrap();

    assert_eq!(outcome.status, HealthStatus::Unhealthy);
    assert_eq!(outcome.result["status_code"], 503);
}

#[tokio::test]
async fn test_expected_status_overrides_2xx() {
    let server = server_responding(503, "down").await;

    let outcome = HttpStrategy::new()
        .execute(&config(&server, json!({ "expected_status": [503] })))
        .await
        .unwrap();
    assert_eq!(outcome.status, HealthStatus::Healthy);

    let outcome = HttpStrategy::new()
        .execute(&config(&server, json!({ "expected_status": [200, 204] })))
        .await
        .unwrap();
    assert_eq!(outcome.status, HealthStatus::Unhealthy);
}

#[tokio::test]
async fn test_v1_config_is_migrated_before_execution() {
    let server = server_responding(200, "ok").await;
    let config = VersionedConfig::new(1, json!({ "url": format!("{}/health", server.uri()), "timeout": 2 }));

    let outcome = HttpStrategy::new().execute(&config).await.unwrap();
    assert_eq!(outcome.status, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_timeout_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let config = VersionedConfig::new(2, json!({ "url": server.uri(), "timeout_ms": 100 }));
    assert!(HttpStrategy::new().execute(&config).await.is_err());
}
