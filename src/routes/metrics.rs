//! Prometheus metrics endpoint
//!
//! Exposes application metrics in Prometheus format for monitoring.

use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use tracing::warn;

/// Global Prometheus handle for metrics export
static PROMETHEUS_HANDLE: Lazy<PrometheusHandle> = Lazy::new(|| {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    if metrics::set_global_recorder(recorder).is_err() {
        warn!("A metrics recorder is already installed; /metrics will be empty");
    }
    handle
});

/// Initialize metrics (call once at startup)
pub fn init_metrics() {
    // Force initialization of the lazy static
    let _ = &*PROMETHEUS_HANDLE;

    register_metrics();
}

fn register_metrics() {
    metrics::describe_counter!(
        "conduit_requests_total",
        "Total number of gateway requests processed"
    );
    metrics::describe_histogram!(
        "conduit_request_duration_seconds",
        "Request duration in seconds"
    );
    metrics::describe_counter!(
        "conduit_stream_frames_total",
        "Upstream stream frames by outcome"
    );
    metrics::describe_counter!(
        "conduit_mapping_errors_total",
        "Requests rejected while mapping to a provider schema"
    );
}

/// Prometheus metrics endpoint handler
pub async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE.render()
}

/// Record a request
pub fn record_request(endpoint: &str, provider: &str, status: &str, duration_secs: f64) {
    metrics::counter!(
        "conduit_requests_total",
        "endpoint" => endpoint.to_string(),
        "provider" => provider.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "conduit_request_duration_seconds",
        "endpoint" => endpoint.to_string(),
        "provider" => provider.to_string()
    )
    .record(duration_secs);
}
