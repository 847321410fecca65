//! Chat completions endpoint
//!
//! OpenAI-compatible chat completions API endpoint. The upstream call always
//! streams; `stream: true` callers get forward mode, everyone else gets the
//! aggregated completion as JSON.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};

use super::{parse_request, resolve_provider, sse_response};
use crate::accumulate::Aggregate;
use crate::error::AppResult;
use crate::mapping::Operation;
use crate::routes::metrics::record_request;
use crate::AppState;

/// Handle POST /v1/chat/completions
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let start_time = Instant::now();
    let provider = resolve_provider(&headers, &state);

    let result = dispatch(&state, &provider, &body).await;
    let status = match &result {
        Ok((_, outcome)) => *outcome,
        Err(_) => "error",
    };
    record_request("chat", &provider, status, start_time.elapsed().as_secs_f64());

    result.map(|(response, _)| response)
}

async fn dispatch(
    state: &AppState,
    provider: &str,
    body: &[u8],
) -> AppResult<(Response, &'static str)> {
    let request = parse_request(body)?;

    if request.is_stream() {
        let stream = state.gateway.stream(provider, Operation::Chat, &request).await?;
        return Ok((sse_response(stream)?, "streaming"));
    }

    match state.gateway.aggregate(provider, Operation::Chat, &request).await? {
        Aggregate::Failed(error) => {
            warn!(provider = %provider, error = %error.error.message, "Chat completion failed upstream");
            Ok((error.into_response(), "upstream_error"))
        }
        aggregate => {
            info!(provider = %provider, model = ?request.model(), "Chat completion aggregated");
            Ok((Json(aggregate.to_json()).into_response(), "success"))
        }
    }
}
