//! Canonical request type
//!
//! The gateway accepts OpenAI-compatible request bodies. Instead of a closed
//! struct, the canonical request is an open map of named parameters so that
//! provider schemas can read any key they declare, including ones the gateway
//! itself knows nothing about.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::mapping::MappingError;

/// Canonical request: an open map of named parameters
///
/// Immutable once handed to the mapping engine. Builders such as [`with`]
/// return a modified copy rather than mutating in place.
///
/// [`with`]: CanonicalRequest::with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalRequest(Map<String, Value>);

impl CanonicalRequest {
    /// Wrap an existing parameter map
    pub fn new(params: Map<String, Value>) -> Self {
        Self(params)
    }

    /// Build a canonical request from a JSON value
    ///
    /// # Errors
    ///
    /// Returns `MappingError::InvalidRequest` if the value is not a JSON object.
    pub fn from_value(value: Value) -> Result<Self, MappingError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(MappingError::InvalidRequest(format!(
                "request body must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Parse a canonical request from raw body bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, MappingError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| MappingError::InvalidRequest(format!("Invalid request body: {}", e)))?;
        Self::from_value(value)
    }

    /// Get a parameter by name
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether the request carries a non-null value for `key`
    pub fn contains(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(|v| !v.is_null())
    }

    /// Get a string parameter
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Get a boolean parameter
    pub fn bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    /// Model name, if present
    pub fn model(&self) -> Option<&str> {
        self.str("model")
    }

    /// Whether the caller asked for a streaming response
    pub fn is_stream(&self) -> bool {
        self.bool("stream").unwrap_or(false)
    }

    /// Canonical `messages` array (empty when absent)
    pub fn messages(&self) -> &[Value] {
        self.0
            .get("messages")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Return a copy with `key` set to `value`
    pub fn with(&self, key: &str, value: Value) -> Self {
        let mut params = self.0.clone();
        params.insert(key.to_string(), value);
        Self(params)
    }
}

impl From<Map<String, Value>> for CanonicalRequest {
    fn from(params: Map<String, Value>) -> Self {
        Self(params)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
