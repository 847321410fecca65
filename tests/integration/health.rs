//! Health endpoint integration tests
//!
//! Tests for the health check endpoints:
//! - GET /health - Full health check with provider status
//! - GET /health/ready - Readiness probe
//! - GET /health/live - Liveness probe
//! - GET /metrics - Prometheus scrape endpoint

use axum::http::StatusCode;
use serde_json::Value;

use crate::common::{test_config, test_server};

#[tokio::test]
async fn test_liveness() {
    let server = test_server(conduit::Config::default());
    let response = server.get("/health/live").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_health_reports_providers() {
    let server = test_server(test_config("http://127.0.0.1:9"));
    let response = server.get("/health").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["default_provider"], "openai");

    let providers = body["providers"].as_array().unwrap();
    let configured = |id: &str| {
        providers
            .iter()
            .find(|p| p["id"] == id)
            .map(|p| p["configured"] == true)
    };
    assert_eq!(configured("anthropic"), Some(true));
    assert_eq!(configured("groq"), Some(false));
}

#[tokio::test]
async fn test_unconfigured_is_not_ready() {
    let server = test_server(conduit::Config::default());

    let response = server.get("/health/ready").await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["status"], "unhealthy");
}

#[tokio::test]
async fn test_ready_with_credentials() {
    let server = test_server(test_config("http://127.0.0.1:9"));
    let response = server.get("/health/ready").await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    conduit::routes::metrics::init_metrics();
    let server = test_server(conduit::Config::default());
    let response = server.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::OK);
}
