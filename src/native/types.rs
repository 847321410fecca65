//! Core message types for the canonical API
//!
//! Roles and helpers for reading OpenAI-style message content out of an open
//! JSON request. Provider schemas use these to convert canonical `messages`
//! into their own conversation shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a message participant
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message providing instructions or context
    System,
    /// Developer message (treated like a system message by most providers)
    Developer,
    /// User message from the human
    User,
    /// Assistant message from the AI
    #[default]
    Assistant,
    /// Tool/function result message
    Tool,
}

impl Role {
    /// Parse a role from a canonical message, defaulting to `user`
    pub fn of(message: &Value) -> Self {
        match message.get("role").and_then(Value::as_str) {
            Some("system") => Role::System,
            Some("developer") => Role::Developer,
            Some("assistant") => Role::Assistant,
            Some("tool") | Some("function") => Role::Tool,
            _ => Role::User,
        }
    }

    /// Whether this role carries instructions rather than conversation turns
    pub fn is_instruction(self) -> bool {
        matches!(self, Role::System | Role::Developer)
    }
}

/// Extract text content from a canonical message
///
/// Plain string content is returned directly. For content part arrays, all
/// `text` parts are concatenated and non-text parts are ignored.
pub fn message_text(message: &Value) -> String {
    match message.get("content") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| match part.get("type").and_then(Value::as_str) {
                Some("text") | Some("input_text") | Some("output_text") | None => {
                    part.get("text").and_then(Value::as_str)
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

/// Split a `data:` URL into its media type and base64 payload
pub fn split_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, data) = rest.split_once(',')?;
    let media_type = meta.strip_suffix(";base64")?;
    Some((media_type, data))
}
