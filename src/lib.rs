//! Conduit - protocol adapter for an AI model gateway
//!
//! This library maps one canonical request vocabulary onto many provider
//! APIs, decodes and accumulates their streams, and replays finished
//! responses as Responses API lifecycle events.

pub mod accumulate;
pub mod config;
pub mod error;
pub mod gateway;
pub mod mapping;
pub mod native;
pub mod providers;
pub mod proxy;
pub mod routes;
pub mod streaming;
pub mod synthesize;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

pub use crate::config::Config;
pub use crate::gateway::Gateway;
pub use crate::providers::ProviderRegistry;
pub use crate::proxy::{HttpUpstream, UpstreamTransport};

/// Application state shared across all request handlers
pub struct AppState {
    pub config: Arc<Config>,
    pub gateway: Gateway,
    pub start_time: Instant,
}

impl AppState {
    /// Create a new application state with the reqwest transport
    pub fn new(config: Config) -> Result<Self> {
        // Initialize HTTP client with connection pooling
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(100)
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self::with_transport(config, Arc::new(HttpUpstream::new(http_client))))
    }

    /// Create a state around any transport
    pub fn with_transport(config: Config, transport: Arc<dyn UpstreamTransport>) -> Self {
        let config = Arc::new(config);
        let gateway = Gateway::new(
            Arc::new(ProviderRegistry::builtin()),
            config.clone(),
            transport,
        );
        Self {
            config,
            gateway,
            start_time: Instant::now(),
        }
    }
}
