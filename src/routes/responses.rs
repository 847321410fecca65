//! Responses endpoint
//!
//! `POST /v1/responses` runs the request as a chat completion, converts the
//! aggregated result into a [`ResponseObject`] and returns it as JSON or, for
//! `stream: true`, replays it as the lifecycle event stream.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use tracing::debug;

use super::{parse_request, resolve_provider, sse_response};
use crate::error::AppResult;
use crate::mapping::Operation;
use crate::native::request::CanonicalRequest;
use crate::native::responses::{responses_request_to_chat, ResponseObject};
use crate::routes::metrics::record_request;
use crate::synthesize::event_stream;
use crate::AppState;

/// Request fields echoed back on the response object
const ECHO_FIELDS: &[&str] = &[
    "instructions",
    "temperature",
    "top_p",
    "max_output_tokens",
    "tools",
    "tool_choice",
    "parallel_tool_calls",
    "metadata",
    "previous_response_id",
];

fn echo_request(response: &mut ResponseObject, request: &CanonicalRequest) {
    for key in ECHO_FIELDS {
        if let Some(value) = request.get(key) {
            response.extra.insert(key.to_string(), value.clone());
        }
    }
}

/// Handle POST /v1/responses
pub async fn create_response(
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
    record_request("responses", &provider, status, start_time.elapsed().as_secs_f64());

    result.map(|(response, _)| response)
}

async fn dispatch(
    state: &AppState,
    provider: &str,
    body: &[u8],
) -> AppResult<(Response, &'static str)> {
    let request = parse_request(body)?;
    let chat_request = responses_request_to_chat(&request);
    let model = request.model().unwrap_or_default().to_string();

    let aggregate = state
        .gateway
        .aggregate(provider, Operation::Chat, &chat_request)
        .await?;

    let mut response = match aggregate.into_chat() {
        Ok(chat) => ResponseObject::from_chat_completion(&chat),
        Err(error) if request.is_stream() => {
            ResponseObject::failed(model, &error.error.code, error.error.message)
        }
        Err(error) => return Ok((error.into_response(), "upstream_error")),
    };
    echo_request(&mut response, &request);

    debug!(
        provider = %provider,
        response_id = %response.id,
        status = ?response.status,
        items = response.output.len(),
        "Responses object ready"
    );

    if request.is_stream() {
        let outcome = if response.error.is_some() { "upstream_error" } else { "streaming" };
        return Ok((sse_response(event_stream(&response))?, outcome));
    }
    Ok((Json(response).into_response(), "success"))
}
