//! Configuration management for Conduit
//!
//! Configuration is loaded from environment variables. Provider credentials
//! use `<PROVIDER>_API_KEY` and `<PROVIDER>_BASE_URL`, where `<PROVIDER>` is
//! the provider id upper-cased with `-` replaced by `_` (`together-ai` reads
//! `TOGETHER_AI_API_KEY`).

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::providers::BUILTIN_PROVIDER_IDS;

/// Credentials and endpoint override for one provider
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub api_key: Option<String>,
    /// Replaces the provider's built-in base URL
    pub base_url: Option<String>,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,

    /// Upstream request timeout (in seconds)
    pub request_timeout_secs: u64,

    /// Provider used when a request names none
    pub default_provider: String,

    /// Per-provider credentials keyed by provider id
    pub providers: HashMap<String, ProviderCredentials>,

    /// Enable debug logging of mapped requests
    pub debug_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 300,
            default_provider: "openai".to_string(),
            providers: HashMap::new(),
            debug_enabled: false,
        }
    }
}

/// Environment variable prefix for a provider id
pub fn env_prefix(provider_id: &str) -> String {
    provider_id.to_ascii_uppercase().replace('-', "_")
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let providers = BUILTIN_PROVIDER_IDS
            .iter()
            .filter_map(|id| {
                let prefix = env_prefix(id);
                let credentials = ProviderCredentials {
                    api_key: lookup(&format!("{}_API_KEY", prefix)).filter(|k| !k.is_empty()),
                    base_url: lookup(&format!("{}_BASE_URL", prefix))
                        .filter(|u| !u.is_empty())
                        .map(|u| u.trim_end_matches('/').to_string()),
                };
                (credentials != ProviderCredentials::default()).then(|| (id.to_string(), credentials))
            })
            .collect();

        Ok(Self {
            host: lookup("CONDUIT_HOST").unwrap_or(defaults.host),
            port: match lookup("CONDUIT_PORT") {
                Some(port) => port.parse().context("Invalid CONDUIT_PORT")?,
                None => defaults.port,
            },

            request_timeout_secs: match lookup("CONDUIT_REQUEST_TIMEOUT_SECS") {
                Some(secs) => secs.parse().context("Invalid CONDUIT_REQUEST_TIMEOUT_SECS")?,
                None => defaults.request_timeout_secs,
            },

            default_provider: lookup("CONDUIT_DEFAULT_PROVIDER").unwrap_or(defaults.default_provider),

            providers,

            debug_enabled: lookup("CONDUIT_DEBUG")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }

    /// Add or replace credentials for one provider
    pub fn with_provider(
        mut self,
        provider_id: &str,
        api_key: impl Into<String>,
        base_url: Option<&str>,
    ) -> Self {
        self.providers.insert(
            provider_id.to_string(),
            ProviderCredentials {
                api_key: Some(api_key.into()),
                base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            },
        );
        self
    }

    pub fn api_key(&self, provider_id: &str) -> Option<&str> {
        self.providers.get(provider_id)?.api_key.as_deref()
    }

    pub fn base_url(&self, provider_id: &str) -> Option<&str> {
        self.providers.get(provider_id)?.base_url.as_deref()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
