//! SSE framing for canonical streams
//!
//! Every chunk the gateway writes to a client goes through these helpers so
//! that forward-mode chunks, lifecycle events and error events share exactly
//! one wire format: UTF-8 text, optional `event:` line, one `data:` line and
//! a terminating blank line.

use serde::Serialize;
use thiserror::Error;
use tracing::error;

use super::response::{Delta, StreamChoice, StreamChunk, Usage};

/// Stream terminator used by OpenAI-compatible protocols
pub const SSE_DONE: &str = "data: [DONE]\n\n";

/// Metadata cached across streaming chunks for consistent response generation.
///
/// When normalizing a provider stream, the first frame typically carries the
/// id, model and creation time. Every canonical chunk re-uses them.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMetadata {
    /// Unique identifier for this completion
    pub id: String,
    /// Model used for completion
    pub model: String,
    /// Unix timestamp of creation
    pub created: u64,
}

/// Serialize a value to JSON for framing
///
/// Values framed here are built from owned JSON-compatible data, so failure
/// only happens on non-string map keys. That case is logged and framed as an
/// empty object rather than aborting the stream.
fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        error!(error = %e, "Failed to serialize SSE payload");
        "{}".to_string()
    })
}

/// Format a serializable payload as an SSE data event: `data: {json}\n\n`
pub fn format_sse_data<T: Serialize>(payload: &T) -> String {
    format!("data: {}\n\n", to_json(payload))
}

/// Format a named SSE event: `event: <name>\ndata: {json}\n\n`
pub fn format_sse_event<T: Serialize>(event: &str, payload: &T) -> String {
    format!("event: {}\ndata: {}\n\n", event, to_json(payload))
}

/// Format a stream chunk as an SSE data event.
pub fn format_sse_chunk(chunk: &StreamChunk) -> String {
    format_sse_data(chunk)
}

/// Format the SSE done marker.
pub fn format_sse_done() -> String {
    SSE_DONE.to_string()
}

/// Create a stream chunk with consistent metadata.
///
/// Ensures every chunk in a stream shares the same id, model and created
/// fields, regardless of which provider frame produced it.
pub fn create_chunk_with_metadata(
    metadata: &StreamMetadata,
    index: u32,
    delta: Delta,
    finish_reason: Option<String>,
    usage: Option<Usage>,
) -> StreamChunk {
    StreamChunk {
        id: metadata.id.clone(),
        object: "chat.completion.chunk".to_string(),
        created: metadata.created,
        model: metadata.model.clone(),
        choices: vec![StreamChoice {
            index,
            delta,
            finish_reason,
        }],
        usage,
    }
}

/// SSE error event structure for stream errors.
#[derive(Debug, Serialize)]
struct SseErrorEvent {
    error: SseErrorDetails,
}

#[derive(Debug, Serialize)]
struct SseErrorDetails {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

/// Format an error as an SSE error event.
///
/// Clients receive the error payload before the stream closes.
pub fn format_error_event(message: &str, code: Option<&str>) -> String {
    let event = SseErrorEvent {
        error: SseErrorDetails {
            message: message.to_string(),
            error_type: "stream_error".to_string(),
            code: code.map(|c| c.to_string()),
        },
    };
    format_sse_data(&event)
}

// ============================================================================
// Stream Errors
// ============================================================================

/// Errors that can occur during stream processing.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StreamError {
    /// A single frame could not be parsed; the stream continues
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Reading from the upstream failed (reset, timeout, ...)
    #[error("Upstream read failed: {0}")]
    Upstream(String),

    /// Provider returned an explicit error payload in the stream
    #[error("Provider error: {message}")]
    ProviderError {
        /// Error message from the provider
        message: String,
        /// Optional error code
        code: Option<String>,
    },
}

impl StreamError {
    /// Whether the stream must end after this error
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamError::MalformedFrame(_))
    }
}

/// Format a stream error as an SSE error event.
pub fn format_error_chunk(error: &StreamError) -> String {
    match error {
        StreamError::MalformedFrame(msg) => format_error_event(msg, Some("parse_error")),
        StreamError::Upstream(msg) => format_error_event(msg, Some("upstream_error")),
        StreamError::ProviderError { message, code } => {
            format_error_event(message, code.as_deref())
        }
    }
}
