//! Upstream transport
//!
//! The gateway talks to providers through [`UpstreamTransport`] so the
//! mapping and accumulation pipeline can be driven without a network.
//! [`HttpUpstream`] is the reqwest implementation used in production.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::HeaderMap;
use serde_json::Value;

use super::logging::RequestContext;
use crate::error::{AppError, AppResult};
use crate::mapping::ProviderRequest;
use crate::native::streaming::StreamError;
use crate::streaming::{truncate_for_log, ByteStream};

/// One fully-prepared upstream call
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub body: ProviderRequest,
    pub context: RequestContext,
}

/// Sends prepared calls and returns the response body as a byte stream
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    /// Non-2xx responses are returned as [`AppError::Upstream`]
    async fn send(&self, request: UpstreamRequest) -> AppResult<ByteStream>;
}

/// Pull a human-readable message out of an upstream error body
pub fn upstream_error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|value| {
        let error = value.get("error").unwrap_or(value);
        match error {
            Value::String(message) => Some(message.clone()),
            other => other.get("message").and_then(Value::as_str).map(str::to_string),
        }
    });
    message.unwrap_or_else(|| truncate_for_log(body.trim()).to_string())
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UpstreamTransport for HttpUpstream {
    async fn send(&self, request: UpstreamRequest) -> AppResult<ByteStream> {
        let UpstreamRequest { url, headers, body, context } = request;

        let payload = serde_json::to_vec(&body)?;
        context.log_upstream_request(&url, payload.len());

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .body(payload)
            .send()
            .await
            .map_err(|e| {
                let status = if e.is_timeout() {
                    context.log_timeout(&url);
                    504
                } else {
                    context.log_connection_error(&e.to_string(), &url);
                    502
                };
                AppError::Upstream {
                    provider: context.provider.clone(),
                    status,
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        context.log_upstream_response(status.as_u16());

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = upstream_error_message(&text);
            context.log_error(&message);
            return Err(AppError::Upstream {
                provider: context.provider.clone(),
                status: status.as_u16(),
                message,
            });
        }

        Ok(Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| StreamError::Upstream(e.to_string()))),
        ))
    }
}
