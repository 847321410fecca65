//! Streaming response accumulation
//!
//! Decoded frames are consumed in one of two modes:
//!
//! - [`forward`]: every frame becomes a ready-to-write canonical SSE chunk,
//!   paced per adapter.
//! - [`aggregate`]: every frame is folded into one [`AccumulatorState`] which
//!   becomes the final canonical response at stream end.
//!
//! Provider families differ in how frames accumulate (deltas, snapshots, a
//! single terminal frame), so each family implements
//! [`ProviderStreamAdapter`].

mod aggregate;
mod forward;
mod state;

use std::time::Duration;

use serde_json::Value;

use crate::native::error::NativeErrorResponse;
use crate::native::response::{ChatCompletionResponse, TranscriptionResponse};
use crate::native::streaming::StreamError;
use crate::streaming::{is_comment, is_done};

pub use aggregate::{aggregate, Aggregator};
pub use forward::{forward, SseStream};
pub use state::{
    AccumulatorState, BlockKind, CandidateSnapshot, ChoiceState, SnapshotPart, ToolCallState,
};

/// Consumption mode for a frame stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Forward,
    Aggregate,
}

/// Forward-mode timing for one adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Delay before the first emitted chunk
    pub first_chunk_delay: Duration,
    /// Delay before every later chunk, for providers that burst
    pub inter_chunk_delay: Option<Duration>,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            first_chunk_delay: Duration::from_millis(25),
            inter_chunk_delay: None,
        }
    }
}

impl Pacing {
    /// No delays at all
    pub const fn immediate() -> Self {
        Self {
            first_chunk_delay: Duration::ZERO,
            inter_chunk_delay: None,
        }
    }

    pub fn with_inter_chunk_delay(mut self, delay: Duration) -> Self {
        self.inter_chunk_delay = Some(delay);
        self
    }
}

/// Final result of aggregate mode
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    Chat(ChatCompletionResponse),
    Transcription(TranscriptionResponse),
    /// The stream ended with a provider or read error
    Failed(NativeErrorResponse),
}

impl Aggregate {
    /// Chat completion, or the failure for any other outcome
    pub fn into_chat(self) -> Result<ChatCompletionResponse, NativeErrorResponse> {
        match self {
            Aggregate::Chat(chat) => Ok(chat),
            Aggregate::Failed(error) => Err(error),
            Aggregate::Transcription(_) => Err(NativeErrorResponse::internal(
                "Transcription stream cannot be read as a chat completion",
            )),
        }
    }

    /// Serialize as the JSON body returned to non-streaming callers
    pub fn to_json(&self) -> Value {
        let value = match self {
            Aggregate::Chat(chat) => serde_json::to_value(chat),
            Aggregate::Transcription(transcription) => serde_json::to_value(transcription),
            Aggregate::Failed(error) => serde_json::to_value(error),
        };
        value.unwrap_or(Value::Null)
    }
}

/// Per-family stream protocol
///
/// Implementations must hold no per-stream state themselves; everything a
/// stream accumulates lives in the [`AccumulatorState`] passed in.
pub trait ProviderStreamAdapter: Send + Sync {
    /// Provider id used in logs, metrics and error attribution
    fn provider(&self) -> &str;

    /// Frame separator of the upstream protocol
    fn delimiter(&self) -> &'static str {
        "\n\n"
    }

    fn pacing(&self) -> Pacing {
        Pacing::default()
    }

    /// Decoder veto: heartbeats never pass, `[DONE]` only in forward mode
    fn keep_frame(&self, frame: &str, mode: Mode) -> bool {
        if is_comment(frame) {
            return false;
        }
        !(mode == Mode::Aggregate && is_done(frame))
    }

    /// Convert one frame into a framed canonical SSE chunk
    ///
    /// `Ok(None)` suppresses the frame. `MalformedFrame` skips it; any other
    /// error ends the stream.
    fn frame_to_chunk(
        &self,
        frame: &str,
        state: &mut AccumulatorState,
    ) -> Result<Option<String>, StreamError>;

    /// Fold one frame into the aggregate state
    fn fold_frame(&self, state: &mut AccumulatorState, frame: &str) -> Result<(), StreamError>;

    /// Turn the folded state into the final response
    fn finish(&self, state: AccumulatorState) -> Aggregate {
        Aggregate::Chat(state.into_chat_completion())
    }

    /// Whether forward mode appends `data: [DONE]` itself
    fn appends_done(&self) -> bool {
        false
    }
}

/// Parse a frame payload as JSON
pub fn parse_json(data: &str) -> Result<Value, StreamError> {
    serde_json::from_str(data).map_err(|e| StreamError::MalformedFrame(e.to_string()))
}

/// Detect an explicit error payload (`{"error": ...}`)
pub fn provider_error(payload: &Value) -> Option<StreamError> {
    let error = payload.get("error").filter(|e| !e.is_null())?;

    let message = match error {
        Value::String(message) => message.clone(),
        other => other
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    };
    let code = ["code", "type", "status"].iter().find_map(|key| match error.get(*key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    });

    Some(StreamError::ProviderError { message, code })
}
