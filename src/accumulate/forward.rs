//! Forward mode: one canonical SSE chunk per upstream frame

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use super::{AccumulatorState, ProviderStreamAdapter};
use crate::native::streaming::{format_error_chunk, format_sse_done, StreamError};
use crate::streaming::{truncate_for_log, FrameStream};

/// Ready-to-write SSE chunks
pub type SseStream = Pin<Box<dyn Stream<Item = String> + Send>>;

fn record_frame(provider: &str, outcome: &'static str) {
    metrics::counter!(
        "conduit_stream_frames_total",
        "provider" => provider.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Re-emit every frame as a canonical chunk
///
/// Malformed frames are logged and skipped. A terminal error emits one error
/// event and ends the stream. Dropping the returned stream drops `frames`.
pub fn forward(frames: FrameStream, adapter: Arc<dyn ProviderStreamAdapter>) -> SseStream {
    Box::pin(async_stream::stream! {
        futures::pin_mut!(frames);
        let pacing = adapter.pacing();
        let mut state = AccumulatorState::new();
        let mut emitted = 0usize;
        let mut failed = false;

        while let Some(frame) = frames.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(provider = %adapter.provider(), error = %e, "Upstream stream read failed");
                    yield format_error_chunk(&e);
                    failed = true;
                    break;
                }
            };

            match adapter.frame_to_chunk(&frame, &mut state) {
                Ok(Some(chunk)) => {
                    let delay = if emitted == 0 {
                        Some(pacing.first_chunk_delay)
                    } else {
                        pacing.inter_chunk_delay
                    };
                    if let Some(delay) = delay.filter(|d| !d.is_zero()) {
                        tokio::time::sleep(delay).await;
                    }
                    emitted += 1;
                    record_frame(adapter.provider(), "forwarded");
                    yield chunk;
                }
                Ok(None) => record_frame(adapter.provider(), "suppressed"),
                Err(StreamError::MalformedFrame(reason)) => {
                    warn!(
                        provider = %adapter.provider(),
                        error = %reason,
                        frame = %truncate_for_log(&frame),
                        frame_len = frame.len(),
                        "Skipping malformed stream frame"
                    );
                    record_frame(adapter.provider(), "malformed");
                }
                Err(e) => {
                    warn!(provider = %adapter.provider(), error = %e, "Provider reported a stream error");
                    yield format_error_chunk(&e);
                    failed = true;
                    break;
                }
            }
        }

        if !failed && adapter.appends_done() {
            yield format_sse_done();
        }

        debug!(provider = %adapter.provider(), chunks = emitted, failed = failed, "Forward stream finished");
    })
}
