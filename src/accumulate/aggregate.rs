//! Aggregate mode: fold a whole stream into one response

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, warn};

use super::{Aggregate, AccumulatorState, Mode, ProviderStreamAdapter};
use crate::native::error::NativeErrorResponse;
use crate::native::streaming::StreamError;
use crate::streaming::{truncate_for_log, FrameStream};

/// Incremental fold over frames of one stream
pub struct Aggregator {
    adapter: Arc<dyn ProviderStreamAdapter>,
    state: AccumulatorState,
    folded: usize,
    malformed: usize,
    failure: Option<StreamError>,
}

impl Aggregator {
    pub fn new(adapter: Arc<dyn ProviderStreamAdapter>) -> Self {
        Self {
            adapter,
            state: AccumulatorState::new(),
            folded: 0,
            malformed: 0,
            failure: None,
        }
    }

    pub fn state(&self) -> &AccumulatorState {
        &self.state
    }

    /// Whether a terminal error has been recorded
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Fold one frame
    ///
    /// Frames after a terminal error are ignored. Returns the terminal error
    /// the first time one is seen, so callers can stop reading.
    pub fn push(&mut self, frame: &str) -> Result<(), StreamError> {
        if self.failure.is_some() || !self.adapter.keep_frame(frame, Mode::Aggregate) {
            return Ok(());
        }

        match self.adapter.fold_frame(&mut self.state, frame) {
            Ok(()) => {
                self.folded += 1;
                Ok(())
            }
            Err(StreamError::MalformedFrame(reason)) => {
                self.malformed += 1;
                warn!(
                    provider = %self.adapter.provider(),
                    error = %reason,
                    frame = %truncate_for_log(frame),
                    frame_len = frame.len(),
                    "Skipping malformed stream frame"
                );
                metrics::counter!(
                    "conduit_stream_frames_total",
                    "provider" => self.adapter.provider().to_string(),
                    "outcome" => "malformed"
                )
                .increment(1);
                Ok(())
            }
            Err(e) => {
                self.fail(e.clone());
                Err(e)
            }
        }
    }

    /// Record a terminal error (provider payload or read failure)
    pub fn fail(&mut self, error: StreamError) {
        if self.failure.is_none() {
            warn!(provider = %self.adapter.provider(), error = %error, "Aggregated stream failed");
            self.failure = Some(error);
        }
    }

    /// Produce the final response
    pub fn finish(self) -> Aggregate {
        debug!(
            provider = %self.adapter.provider(),
            folded = self.folded,
            malformed = self.malformed,
            "Aggregated stream finished"
        );

        if let Some(error) = self.failure {
            let message = match error {
                StreamError::ProviderError { message, .. } => message,
                other => other.to_string(),
            };
            return Aggregate::Failed(NativeErrorResponse::provider_error(
                message,
                self.adapter.provider(),
            ));
        }

        self.adapter.finish(self.state)
    }
}

/// Consume `frames` and fold them into one final response
///
/// Reading stops at the first terminal error.
pub async fn aggregate(frames: FrameStream, adapter: Arc<dyn ProviderStreamAdapter>) -> Aggregate {
    let mut aggregator = Aggregator::new(adapter);
    futures::pin_mut!(frames);

    while let Some(frame) = frames.next().await {
        let result = match frame {
            Ok(frame) => aggregator.push(&frame),
            Err(e) => {
                aggregator.fail(e.clone());
                Err(e)
            }
        };
        if result.is_err() {
            break;
        }
    }

    aggregator.finish()
}
