//! Request logging utilities for upstream provider calls
//!
//! Provides structured logging with correlation IDs for tracing one gateway
//! call from mapping through the upstream response to stream end.

use std::time::Instant;
use tracing::{debug, error, info, Span};
use uuid::Uuid;

use crate::mapping::Operation;

/// Context for tracking a request through the system
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique identifier for this request (for log correlation)
    pub trace_id: String,
    /// When the request started
    pub start_time: Instant,
    /// Provider handling this request
    pub provider: String,
    /// Operation being performed
    pub operation: Operation,
    /// Model being used (if applicable)
    pub model: Option<String>,
    /// Whether the client receives a live stream
    pub streaming: bool,
}

impl RequestContext {
    pub fn new(provider: &str, operation: Operation) -> Self {
        Self {
            trace_id: Uuid::new_v4().simple().to_string()[..8].to_string(),
            start_time: Instant::now(),
            provider: provider.to_string(),
            operation,
            model: None,
            streaming: false,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u128 {
        self.start_time.elapsed().as_millis()
    }

    pub fn log_request_start(&self) {
        info!(
            trace_id = %self.trace_id,
            provider = %self.provider,
            operation = %self.operation,
            model = ?self.model,
            streaming = %self.streaming,
            "Request started"
        );
    }

    pub fn log_upstream_request(&self, url: &str, body_size: usize) {
        debug!(
            trace_id = %self.trace_id,
            provider = %self.provider,
            url = %url,
            body_size = %body_size,
            elapsed_ms = %self.elapsed_ms(),
            "Sending request to upstream"
        );
    }

    pub fn log_upstream_response(&self, status: u16) {
        info!(
            trace_id = %self.trace_id,
            provider = %self.provider,
            operation = %self.operation,
            status = %status,
            elapsed_ms = %self.elapsed_ms(),
            "Response received from upstream"
        );
    }

    /// Log aggregate completion
    pub fn log_request_complete(&self, tokens: Option<u32>) {
        info!(
            trace_id = %self.trace_id,
            provider = %self.provider,
            operation = %self.operation,
            model = ?self.model,
            tokens = ?tokens,
            elapsed_ms = %self.elapsed_ms(),
            "Request completed successfully"
        );
    }

    pub fn log_stream_started(&self) {
        info!(
            trace_id = %self.trace_id,
            provider = %self.provider,
            operation = %self.operation,
            elapsed_ms = %self.elapsed_ms(),
            "Streaming response started"
        );
    }

    pub fn log_error(&self, error: &str) {
        error!(
            trace_id = %self.trace_id,
            provider = %self.provider,
            operation = %self.operation,
            model = ?self.model,
            streaming = %self.streaming,
            elapsed_ms = %self.elapsed_ms(),
            error = %error,
            "Request failed"
        );
    }

    /// Log connection error (specific for debugging connectivity issues)
    pub fn log_connection_error(&self, error: &str, url: &str) {
        error!(
            trace_id = %self.trace_id,
            provider = %self.provider,
            url = %url,
            elapsed_ms = %self.elapsed_ms(),
            error = %error,
            "Connection to upstream failed"
        );
    }

    pub fn log_timeout(&self, url: &str) {
        error!(
            trace_id = %self.trace_id,
            provider = %self.provider,
            url = %url,
            elapsed_ms = %self.elapsed_ms(),
            "Upstream request timed out"
        );
    }

    /// Create a tracing span for this request
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "gateway_request",
            trace_id = %self.trace_id,
            provider = %self.provider,
            operation = %self.operation,
            model = ?self.model,
            streaming = %self.streaming,
        )
    }
}
