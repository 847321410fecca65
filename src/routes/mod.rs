//! HTTP routes for Conduit
//!
//! A thin dispatch surface over the [`Gateway`](crate::gateway::Gateway).
//! Routing is out of scope: the caller names the resolved provider in the
//! `x-conduit-provider` header, or the configured default is used.

pub mod chat;
pub mod health;
pub mod metrics;
pub mod responses;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::accumulate::SseStream;
use crate::error::{AppError, AppResult};
use crate::native::request::CanonicalRequest;
use crate::AppState;

/// Header naming the provider a request is dispatched to
pub const PROVIDER_HEADER: &str = "x-conduit-provider";

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/v1/responses", post(responses::create_response));

    // Public routes (health checks, metrics)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/health/live", get(health::liveness_check))
        .route("/metrics", get(metrics::prometheus_metrics));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Provider named by the request, else the configured default
pub fn resolve_provider(headers: &HeaderMap, state: &AppState) -> String {
    headers
        .get(PROVIDER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(&state.config.default_provider)
        .to_string()
}

/// Parse a JSON request body into the canonical request
pub fn parse_request(body: &[u8]) -> AppResult<CanonicalRequest> {
    Ok(CanonicalRequest::from_slice(body)?)
}

/// Wrap an SSE stream in a streaming HTTP response
pub fn sse_response(stream: SseStream) -> AppResult<Response> {
    let body = Body::from_stream(futures::StreamExt::map(stream, Ok::<_, std::convert::Infallible>));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(body)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use axum::http::HeaderValue;

    struct NoUpstream;

    #[async_trait::async_trait]
    impl crate::UpstreamTransport for NoUpstream {
        async fn send(
            &self,
            request: crate::proxy::UpstreamRequest,
        ) -> AppResult<crate::streaming::ByteStream> {
            Err(AppError::ServiceUnavailable(request.url))
        }
    }

    fn state() -> AppState {
        let config = Config {
            default_provider: "anthropic".to_string(),
            ..Config::default()
        };
        AppState::with_transport(config, Arc::new(NoUpstream))
    }

    #[test]
    fn test_resolve_provider_header() {
        let mut headers = HeaderMap::new();
        headers.insert(PROVIDER_HEADER, HeaderValue::from_static("google"));
        assert_eq!(resolve_provider(&headers, &state()), "google");
    }

    #[test]
    fn test_resolve_provider_default() {
        let mut headers = HeaderMap::new();
        assert_eq!(resolve_provider(&headers, &state()), "anthropic");

        headers.insert(PROVIDER_HEADER, HeaderValue::from_static("  "));
        assert_eq!(resolve_provider(&headers, &state()), "anthropic");
    }

    #[test]
    fn test_parse_request_rejects_non_object() {
        assert!(matches!(parse_request(b"[1, 2]"), Err(AppError::Mapping(_))));
        assert!(parse_request(br#"{"model":"gpt-4o"}"#).is_ok());
    }
}
