//! Native API types for Conduit
//!
//! This module defines the canonical request and response shapes every
//! provider maps from and back to. Types are OpenAI-compatible so existing
//! clients work unchanged.

pub mod error;
pub mod request;
pub mod response;
pub mod responses;
pub mod streaming;
pub mod types;

// Re-export key types for convenience
pub use request::CanonicalRequest;
pub use response::{
    ChatCompletionResponse, Choice, ChoiceMessage, Delta, StreamChoice, StreamChunk,
    TranscriptionResponse, Usage,
};
pub use responses::{ResponseObject, ResponseStatus};
pub use types::Role;
