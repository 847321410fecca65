//! Common test utilities for Conduit
//!
//! This module provides shared test fixtures and helpers used across the
//! integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum_test::TestServer;

use conduit::{routes::create_router, AppState, Config};

/// Test configuration constants
pub mod constants {
    pub const TEST_OPENAI_API_KEY: &str = "test-openai-api-key";
    pub const TEST_ANTHROPIC_API_KEY: &str = "test-anthropic-api-key";
    pub const TEST_GOOGLE_API_KEY: &str = "test-google-api-key";
    pub const TEST_COHERE_API_KEY: &str = "test-cohere-api-key";
}

/// Config pointing every built-in family at `upstream_uri`
///
/// OpenAI-compatible and Anthropic paths sit under `/v1`; Google under
/// `/v1beta`; Cohere under `/v1`.
pub fn test_config(upstream_uri: &str) -> Config {
    Config::default()
        .with_provider(
            "openai",
            constants::TEST_OPENAI_API_KEY,
            Some(&format!("{}/v1", upstream_uri)),
        )
        .with_provider(
            "anthropic",
            constants::TEST_ANTHROPIC_API_KEY,
            Some(&format!("{}/v1", upstream_uri)),
        )
        .with_provider(
            "google",
            constants::TEST_GOOGLE_API_KEY,
            Some(&format!("{}/v1beta", upstream_uri)),
        )
        .with_provider(
            "cohere",
            constants::TEST_COHERE_API_KEY,
            Some(&format!("{}/v1", upstream_uri)),
        )
}

/// Test server over the full router with the reqwest transport
pub fn test_server(config: Config) -> TestServer {
    let state = Arc::new(AppState::new(config).expect("Failed to build app state"));
    TestServer::new(create_router(state)).expect("Failed to create test server")
}

/// Provider selection header
pub fn provider_header(id: &'static str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static(conduit::routes::PROVIDER_HEADER),
        HeaderValue::from_static(id),
    )
}

/// Split an SSE body into its `data:` payloads
pub fn sse_data(body: &str) -> Vec<String> {
    body.split("\n\n")
        .filter_map(|frame| {
            frame
                .lines()
                .find_map(|line| line.strip_prefix("data: "))
                .map(str::to_string)
        })
        .collect()
}

/// Split an SSE body into its `event:` names
pub fn sse_events(body: &str) -> Vec<String> {
    body.split("\n\n")
        .filter_map(|frame| {
            frame
                .lines()
                .find_map(|line| line.strip_prefix("event: "))
                .map(str::to_string)
        })
        .collect()
}
