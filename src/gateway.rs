//! Gateway pipeline
//!
//! One call runs: canonical request → provider schema → upstream request →
//! byte stream → frames → forward chunks or one aggregated response.
//! Upstream calls always stream. Non-streaming callers get the aggregate.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, Instrument};

use crate::accumulate::{aggregate, forward, Aggregate, Mode, ProviderStreamAdapter, SseStream};
use crate::config::{env_prefix, Config};
use crate::error::{AppError, AppResult};
use crate::mapping::{MappingError, Operation, ProviderRequest};
use crate::native::request::CanonicalRequest;
use crate::providers::{Provider, ProviderRegistry};
use crate::proxy::{build_provider_headers, RequestContext, UpstreamRequest, UpstreamTransport};
use crate::streaming::{decode_stream_filtered, FrameStream};

/// A mapped call ready to send
pub struct PreparedCall {
    pub url: String,
    pub body: ProviderRequest,
    pub adapter: Arc<dyn ProviderStreamAdapter>,
    request: UpstreamRequest,
}

impl std::fmt::Debug for PreparedCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedCall")
            .field("url", &self.url)
            .field("provider", &self.adapter.provider())
            .finish()
    }
}

impl PreparedCall {
    pub fn context(&self) -> &RequestContext {
        &self.request.context
    }
}

#[derive(Clone)]
pub struct Gateway {
    registry: Arc<ProviderRegistry>,
    config: Arc<Config>,
    transport: Arc<dyn UpstreamTransport>,
}

fn record_mapping_error(provider: &str, error: &MappingError) {
    let kind = match error {
        MappingError::MissingRequiredParameter(_) => "missing_parameter",
        MappingError::UnsupportedProvider(_) => "unsupported_provider",
        MappingError::UnsupportedOperation { .. } => "unsupported_operation",
        MappingError::InvalidRequest(_) => "invalid_request",
    };
    metrics::counter!(
        "conduit_mapping_errors_total",
        "provider" => provider.to_string(),
        "kind" => kind
    )
    .increment(1);
}

impl Gateway {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        config: Arc<Config>,
        transport: Arc<dyn UpstreamTransport>,
    ) -> Self {
        Self {
            registry,
            config,
            transport,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Full upstream URL for one call, honouring base URL overrides
    pub fn endpoint_for(
        &self,
        provider: &dyn Provider,
        operation: Operation,
        model: &str,
        stream: bool,
    ) -> Result<String, MappingError> {
        let path = provider
            .endpoint(operation, model, stream)
            .ok_or_else(|| MappingError::UnsupportedOperation {
                provider: provider.id().to_string(),
                operation,
            })?;
        let base = self
            .config
            .base_url(provider.id())
            .unwrap_or(provider.info().base_url);
        Ok(format!("{}{}", base, path))
    }

    /// Map `request` for `provider_id` and resolve everything needed to send it
    pub fn prepare(
        &self,
        provider_id: &str,
        operation: Operation,
        request: &CanonicalRequest,
    ) -> AppResult<PreparedCall> {
        let mapping = |e: MappingError| {
            record_mapping_error(provider_id, &e);
            AppError::Mapping(e)
        };

        let provider = self.registry.get(provider_id).map_err(mapping)?;
        let adapter = self
            .registry
            .stream_adapter(provider_id, operation)
            .map_err(mapping)?;

        // Upstream always streams
        let request = request.with("stream", json!(true));
        let body = self
            .registry
            .build_request(provider_id, operation, &request)
            .map_err(mapping)?;
        let model = request.model().unwrap_or_default().to_string();
        let url = self
            .endpoint_for(&**provider, operation, &model, true)
            .map_err(mapping)?;

        let api_key = self.config.api_key(provider_id).ok_or_else(|| {
            AppError::ServiceUnavailable(format!("{}_API_KEY is not configured", env_prefix(provider_id)))
        })?;
        let headers = build_provider_headers(provider.info(), api_key)?;

        if self.config.debug_enabled {
            debug!(
                provider = %provider_id,
                operation = %operation,
                family = ?provider.info().family,
                body = %serde_json::Value::Object(body.clone()),
                "Mapped upstream request"
            );
        }

        let context = RequestContext::new(provider_id, operation).with_model(model);
        Ok(PreparedCall {
            request: UpstreamRequest {
                url: url.clone(),
                headers,
                body: body.clone(),
                context,
            },
            url,
            body,
            adapter,
        })
    }

    /// Send a prepared call and decode the response into frames
    pub async fn open(&self, call: &PreparedCall, mode: Mode) -> AppResult<FrameStream> {
        let bytes = self.transport.send(call.request.clone()).await?;
        let adapter = call.adapter.clone();
        Ok(decode_stream_filtered(bytes, adapter.delimiter(), move |frame| {
            adapter.keep_frame(frame, mode)
        }))
    }

    /// Forward mode: canonical SSE chunks as they arrive
    ///
    /// Dropping the returned stream stops reading from the provider.
    pub async fn stream(
        &self,
        provider_id: &str,
        operation: Operation,
        request: &CanonicalRequest,
    ) -> AppResult<SseStream> {
        let mut call = self.prepare(provider_id, operation, request)?;
        call.request.context.streaming = true;
        let context = call.context().clone();
        context.log_request_start();

        let frames = self
            .open(&call, Mode::Forward)
            .instrument(context.create_span())
            .await
            .map_err(|e| {
                context.log_error(&e.to_string());
                e
            })?;
        context.log_stream_started();
        Ok(forward(frames, call.adapter))
    }

    /// Aggregate mode: the whole stream folded into one response
    ///
    /// Stream failures come back as [`Aggregate::Failed`] with the provider
    /// attached; failures before the stream starts are errors.
    pub async fn aggregate(
        &self,
        provider_id: &str,
        operation: Operation,
        request: &CanonicalRequest,
    ) -> AppResult<Aggregate> {
        let call = self.prepare(provider_id, operation, request)?;
        let context = call.context().clone();
        context.log_request_start();

        let span = context.create_span();
        let result = async {
            let frames = self.open(&call, Mode::Aggregate).await?;
            Ok::<_, AppError>(aggregate(frames, call.adapter.clone()).await)
        }
        .instrument(span)
        .await;

        let mut result = match result {
            Ok(result) => result,
            Err(e) => {
                context.log_error(&e.to_string());
                return Err(e);
            }
        };

        match &mut result {
            Aggregate::Chat(chat) => {
                if chat.model.is_empty() {
                    chat.model = request.model().unwrap_or_default().to_string();
                }
                context.log_request_complete(Some(chat.usage.total_tokens));
            }
            Aggregate::Transcription(_) => context.log_request_complete(None),
            Aggregate::Failed(error) => context.log_error(&error.error.message),
        }
        Ok(result)
    }
}
