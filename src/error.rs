//! Error types for Conduit
//!
//! This module defines the application-level error type returned by the
//! gateway and the HTTP surface. Every variant renders as the OpenAI error
//! envelope via [`NativeErrorResponse`].

use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::mapping::MappingError;
use crate::native::error::NativeErrorResponse;
use crate::native::streaming::StreamError;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("Upstream {provider} returned {status}: {message}")]
    Upstream {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Stream from {provider} failed: {source}")]
    Stream {
        provider: String,
        source: StreamError,
    },

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        NativeErrorResponse::from_app_error(self).into_response()
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
