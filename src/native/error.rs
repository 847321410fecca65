//! Unified error responses for the canonical API
//!
//! Errors are wrapped in the OpenAI error envelope so that existing clients
//! can parse them without changes. Upstream failures carry the provider name.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::mapping::MappingError;
use crate::native::streaming::StreamError;

/// Error with OpenAI-compatible structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NativeError {
    /// Human-readable error message
    pub message: String,
    /// Error type category
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error code for programmatic handling
    pub code: String,
    /// Provider hint when error originates from upstream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// Wrapper for error responses matching OpenAI's format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NativeErrorResponse {
    /// The error details
    pub error: NativeError,
}

impl NativeErrorResponse {
    fn build(message: String, error_type: &str, code: &str, provider: Option<&str>) -> Self {
        Self {
            error: NativeError {
                message,
                error_type: error_type.to_string(),
                code: code.to_string(),
                provider: provider.map(str::to_string),
            },
        }
    }

    /// Create a validation error (400 Bad Request)
    pub fn validation(message: impl Into<String>) -> Self {
        Self::build(message.into(), "invalid_request_error", "invalid_request", None)
    }

    /// Create a mapping error for a missing parameter (400 Bad Request)
    pub fn missing_parameter(key: &str) -> Self {
        Self::build(
            format!("Missing required parameter: {}", key),
            "invalid_request_error",
            "missing_required_parameter",
            None,
        )
    }

    /// Create an unsupported provider/operation error (400 Bad Request)
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::build(message.into(), "invalid_request_error", "unsupported", None)
    }

    /// Create a provider error (502 Bad Gateway)
    ///
    /// Use when an upstream provider returns an error. Includes provider hint.
    pub fn provider_error(message: impl Into<String>, provider: &str) -> Self {
        Self::build(message.into(), "upstream_error", "provider_error", Some(provider))
    }

    /// Create an internal server error (500 Internal Server Error)
    pub fn internal(message: impl Into<String>) -> Self {
        Self::build(message.into(), "server_error", "internal_error", None)
    }

    /// Create a service unavailable error (503 Service Unavailable)
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::build(message.into(), "service_unavailable", "service_unavailable", None)
    }

    /// Convert from AppError
    pub fn from_app_error(err: AppError) -> Self {
        match err {
            AppError::BadRequest(msg) => Self::validation(msg),
            AppError::Mapping(MappingError::MissingRequiredParameter(key)) => {
                Self::missing_parameter(&key)
            }
            AppError::Mapping(MappingError::InvalidRequest(msg)) => Self::validation(msg),
            AppError::Mapping(err) => Self::unsupported(err.to_string()),
            AppError::Upstream { provider, message, .. } => Self::provider_error(message, &provider),
            AppError::Stream { provider, source } => match source {
                StreamError::ProviderError { message, .. } => Self::provider_error(message, &provider),
                other => Self::provider_error(other.to_string(), &provider),
            },
            AppError::ServiceUnavailable(msg) => Self::service_unavailable(msg),
            other => Self::internal(other.to_string()),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self.error.error_type.as_str() {
            "invalid_request_error" => StatusCode::BAD_REQUEST,
            "upstream_error" => StatusCode::BAD_GATEWAY,
            "server_error" => StatusCode::INTERNAL_SERVER_ERROR,
            "service_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AppError> for NativeErrorResponse {
    fn from(err: AppError) -> Self {
        Self::from_app_error(err)
    }
}

impl IntoResponse for NativeErrorResponse {
    fn into_response(self) -> Response {
        (self.status_code(), Json(&self)).into_response()
    }
}
