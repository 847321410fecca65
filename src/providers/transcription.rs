//! Streaming transcription protocol
//!
//! Transcription streams send many `transcript.text.delta` frames and one
//! authoritative `transcript.text.done` frame. Forward mode passes frames
//! through; aggregate mode keeps the frames and scans them from the end for
//! the done frame.

use serde_json::Value;

use crate::accumulate::{parse_json, provider_error, AccumulatorState, Aggregate, ProviderStreamAdapter};
use crate::native::response::TranscriptionResponse;
use crate::native::streaming::{format_sse_data, format_sse_done, StreamError};
use crate::streaming::parse_sse_frame;

const DONE_EVENT: &str = "transcript.text.done";

#[derive(Debug, Clone)]
pub struct TranscriptionAdapter {
    provider: &'static str,
}

impl TranscriptionAdapter {
    pub fn new(provider: &'static str) -> Self {
        Self { provider }
    }
}

/// Payload of a data frame, `None` for `[DONE]` and empty frames
fn payload(frame: &str) -> Result<Option<Value>, StreamError> {
    let sse = parse_sse_frame(frame);
    if sse.is_done() || sse.data.is_empty() {
        return Ok(None);
    }
    let payload = parse_json(&sse.data)?;
    match provider_error(&payload) {
        Some(err) => Err(err),
        None => Ok(Some(payload)),
    }
}

/// Find the authoritative frame, scanning from the last one
pub fn find_done(frames: &[String]) -> Option<TranscriptionResponse> {
    frames.iter().rev().find_map(|data| {
        let payload: Value = serde_json::from_str(data).ok()?;
        if payload.get("type").and_then(Value::as_str) != Some(DONE_EVENT) {
            return None;
        }
        Some(TranscriptionResponse {
            text: payload
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            usage: payload.get("usage").filter(|u| !u.is_null()).cloned(),
        })
    })
}

impl ProviderStreamAdapter for TranscriptionAdapter {
    fn provider(&self) -> &str {
        self.provider
    }

    fn frame_to_chunk(
        &self,
        frame: &str,
        _state: &mut AccumulatorState,
    ) -> Result<Option<String>, StreamError> {
        if parse_sse_frame(frame).is_done() {
            return Ok(Some(format_sse_done()));
        }
        Ok(payload(frame)?.map(|payload| format_sse_data(&payload)))
    }

    fn fold_frame(&self, state: &mut AccumulatorState, frame: &str) -> Result<(), StreamError> {
        if let Some(payload) = payload(frame)? {
            state.frames.push(payload.to_string());
        }
        Ok(())
    }

    fn finish(&self, state: AccumulatorState) -> Aggregate {
        Aggregate::Transcription(find_done(&state.frames).unwrap_or_default())
    }
}
