//! Mock infrastructure for testing external services
//!
//! Provides wiremock-backed upstream servers that speak each provider
//! family's stream format. Mocks are reusable across test files.

pub mod providers;

pub use providers::*;
