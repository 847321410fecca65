//! Health check endpoints
//!
//! Provides endpoints for monitoring and container orchestration:
//! - `/health` - Full health check with provider status
//! - `/health/ready` - Readiness probe
//! - `/health/live` - Liveness probe

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::AppState;

/// Health status enum
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Credential status of one registered provider
#[derive(Debug, Serialize)]
pub struct ProviderCheck {
    pub id: String,
    pub configured: bool,
}

/// Full health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: String,
    pub default_provider: String,
    pub providers: Vec<ProviderCheck>,
}

/// Simple health response for liveness/readiness
#[derive(Debug, Serialize)]
pub struct SimpleHealthResponse {
    pub status: HealthStatus,
}

fn provider_checks(state: &AppState) -> Vec<ProviderCheck> {
    state
        .gateway
        .registry()
        .ids()
        .into_iter()
        .map(|id| ProviderCheck {
            id: id.to_string(),
            configured: state.config.api_key(id).is_some(),
        })
        .collect()
}

/// Healthy when the default provider has credentials, degraded when only
/// others do, unhealthy when none do
fn overall_status(state: &AppState, checks: &[ProviderCheck]) -> HealthStatus {
    if state.config.api_key(&state.config.default_provider).is_some() {
        HealthStatus::Healthy
    } else if checks.iter().any(|c| c.configured) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unhealthy
    }
}

/// Full health check endpoint
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let providers = provider_checks(&state);
    let status = overall_status(&state, &providers);

    let status_code = match status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        default_provider: state.config.default_provider.clone(),
        providers,
    };

    (status_code, Json(response))
}

/// Readiness probe endpoint
///
/// Returns 200 OK once any provider can be called.
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<SimpleHealthResponse>) {
    if overall_status(&state, &provider_checks(&state)) == HealthStatus::Unhealthy {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(SimpleHealthResponse {
                status: HealthStatus::Unhealthy,
            }),
        );
    }

    (
        StatusCode::OK,
        Json(SimpleHealthResponse {
            status: HealthStatus::Healthy,
        }),
    )
}

/// Liveness probe endpoint
pub async fn liveness_check() -> (StatusCode, Json<SimpleHealthResponse>) {
    (
        StatusCode::OK,
        Json(SimpleHealthResponse {
            status: HealthStatus::Healthy,
        }),
    )
}
