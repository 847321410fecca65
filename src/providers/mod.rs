//! Provider registry
//!
//! Each provider contributes static lookup data (base URL, auth style,
//! endpoint paths), one [`ProviderSchema`] per supported operation and one
//! [`ProviderStreamAdapter`] per streaming operation. Providers that share a
//! wire shape share a family implementation.

pub mod anthropic;
pub mod cohere;
pub mod google;
pub mod openai;
pub mod transcription;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::error;

use crate::accumulate::ProviderStreamAdapter;
use crate::mapping::{MappingError, Operation, ProviderRequest, ProviderSchema};
use crate::native::request::CanonicalRequest;

/// Ids of the providers shipped with the gateway
pub const BUILTIN_PROVIDER_IDS: &[&str] = &[
    "openai",
    "groq",
    "together-ai",
    "mistral-ai",
    "deepseek",
    "anthropic",
    "google",
    "cohere",
];

/// Group of providers sharing one wire shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderFamily {
    /// Delta chunks (`choices[].delta`)
    OpenAi,
    /// Typed content-block events
    Anthropic,
    /// Candidate snapshots
    Google,
    /// JSON lines ending in one `is_finished` frame
    Cohere,
}

/// How the API key is presented upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// Key in a dedicated header
    Header(&'static str),
}

/// Static description of a provider
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub id: &'static str,
    pub display_name: &'static str,
    pub family: ProviderFamily,
    pub base_url: &'static str,
    pub auth: AuthStyle,
    pub extra_headers: &'static [(&'static str, &'static str)],
}

/// A provider the gateway can dispatch to
pub trait Provider: Send + Sync {
    fn info(&self) -> &ProviderInfo;

    /// Request schema for `operation`, if supported
    fn schema(&self, operation: Operation) -> Option<&ProviderSchema>;

    /// Endpoint path (relative to the base URL) for one call
    fn endpoint(&self, operation: Operation, model: &str, stream: bool) -> Option<String>;

    /// Stream protocol for `operation`, if it streams
    fn stream_adapter(&self, operation: Operation) -> Option<Arc<dyn ProviderStreamAdapter>>;

    fn id(&self) -> &'static str {
        self.info().id
    }

    fn supports(&self, operation: Operation) -> bool {
        self.schema(operation).is_some()
    }
}

/// Lookup table of providers by id
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.providers.keys().collect();
        ids.sort();
        f.debug_struct("ProviderRegistry").field("providers", &ids).finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in provider
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for provider in openai::compatible_providers() {
            registry.register(provider);
        }
        registry.register(Arc::new(anthropic::Anthropic::new()));
        registry.register(Arc::new(google::Google::new()));
        registry.register(Arc::new(cohere::Cohere::new()));
        registry
    }

    /// Add or replace a provider
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.id().to_string(), provider);
    }

    pub fn get(&self, id: &str) -> Result<&Arc<dyn Provider>, MappingError> {
        self.providers
            .get(id)
            .ok_or_else(|| MappingError::UnsupportedProvider(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    /// Sorted provider ids
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn schema(&self, id: &str, operation: Operation) -> Result<&ProviderSchema, MappingError> {
        self.get(id)?
            .schema(operation)
            .ok_or_else(|| MappingError::UnsupportedOperation {
                provider: id.to_string(),
                operation,
            })
    }

    /// Build the upstream body for one provider call
    ///
    /// Unsupported providers and operations are logged before being returned
    /// so the dispatch layer can decide whether to surface or fall back.
    pub fn build_request(
        &self,
        id: &str,
        operation: Operation,
        request: &CanonicalRequest,
    ) -> Result<ProviderRequest, MappingError> {
        let schema = self.schema(id, operation).map_err(|e| {
            error!(provider = %id, operation = %operation, error = %e, "No request schema");
            e
        })?;
        schema.build(request)
    }

    pub fn stream_adapter(
        &self,
        id: &str,
        operation: Operation,
    ) -> Result<Arc<dyn ProviderStreamAdapter>, MappingError> {
        self.get(id)?
            .stream_adapter(operation)
            .ok_or_else(|| MappingError::UnsupportedOperation {
                provider: id.to_string(),
                operation,
            })
    }
}

/// Wrap a single string into a one-element list
pub(crate) fn string_or_list(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => Some(Value::Array(vec![Value::String(s.clone())])),
        Value::Array(_) => Some(value.clone()),
        _ => None,
    }
}

/// Parse tool-call argument text, falling back to an empty object
pub(crate) fn parse_arguments(arguments: Option<&Value>) -> Value {
    match arguments {
        Some(Value::String(text)) => serde_json::from_str(text)
            .ok()
            .filter(Value::is_object)
            .unwrap_or_else(|| Value::Object(Default::default())),
        Some(value @ Value::Object(_)) => value.clone(),
        _ => Value::Object(Default::default()),
    }
}

/// Lenient usage counter reader
pub(crate) fn read_u32(value: &Value, key: &str) -> u32 {
    value
        .get(key)
        .and_then(Value::as_u64)
        .map(|n| n.min(u32::MAX as u64) as u32)
        .unwrap_or(0)
}
