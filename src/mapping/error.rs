//! Mapping errors

use thiserror::Error;

use super::Operation;

/// Errors raised while building a provider request
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MappingError {
    /// A parameter marked `required` resolved to no value
    #[error("Missing required parameter: {0}")]
    MissingRequiredParameter(String),

    /// No provider is registered under this id
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// The provider exists but has no schema for this operation
    #[error("Provider {provider} does not support operation {operation}")]
    UnsupportedOperation {
        provider: String,
        operation: Operation,
    },

    /// The canonical request itself is unusable
    #[error("{0}")]
    InvalidRequest(String),
}
