//! Canonical Responses API types
//!
//! A [`ResponseObject`] is the fully-buffered shape the event synthesizer
//! replays as a lifecycle stream. It can be produced directly by a provider
//! or converted from an aggregated chat completion.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::request::CanonicalRequest;
use super::response::ChatCompletionResponse;
use super::types::Role;

/// Lifecycle status of a response
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    #[default]
    Completed,
    Failed,
    Incomplete,
    InProgress,
    Queued,
    Cancelled,
}

/// Error attached to a failed response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseError {
    pub code: String,
    pub message: String,
}

/// Token usage in Responses API naming
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ResponseUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// A content part of a message output item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    OutputText {
        text: String,
        #[serde(default)]
        annotations: Vec<Value>,
    },
    Refusal {
        refusal: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageItem {
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default = "default_item_status")]
    pub status: String,
    #[serde(default)]
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCallItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub call_id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: String,
    #[serde(default = "default_item_status")]
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebSearchCallItem {
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_item_status")]
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileSearchCallItem {
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_item_status")]
    pub status: String,
    #[serde(default)]
    pub queries: Vec<String>,
    #[serde(default)]
    pub results: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComputerCallItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub call_id: String,
    #[serde(default)]
    pub action: Value,
    #[serde(default)]
    pub pending_safety_checks: Vec<Value>,
    #[serde(default = "default_item_status")]
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReasoningItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub summary: Vec<Value>,
}

/// One item of a response's `output` array
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Message(MessageItem),
    FunctionCall(FunctionCallItem),
    WebSearchCall(WebSearchCallItem),
    FileSearchCall(FileSearchCallItem),
    ComputerCall(ComputerCallItem),
    Reasoning(ReasoningItem),
}

/// Fully-buffered canonical response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseObject {
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_object")]
    pub object: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub status: ResponseStatus,
    #[serde(default)]
    pub error: Option<ResponseError>,
    #[serde(default)]
    pub incomplete_details: Option<Value>,
    #[serde(default)]
    pub output: Vec<OutputItem>,
    #[serde(default)]
    pub usage: Option<ResponseUsage>,
    /// Request echo fields (instructions, temperature, tools, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_role() -> Role {
    Role::Assistant
}

fn default_item_status() -> String {
    "completed".to_string()
}

fn default_object() -> String {
    "response".to_string()
}

impl ResponseObject {
    /// Empty completed response for a model
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            object: default_object(),
            created_at: chrono::Utc::now().timestamp(),
            model: model.into(),
            status: ResponseStatus::Completed,
            error: None,
            incomplete_details: None,
            output: Vec::new(),
            usage: None,
            extra: Map::new(),
        }
    }

    /// Failed response carrying an error
    pub fn failed(model: impl Into<String>, code: &str, message: impl Into<String>) -> Self {
        let mut response = Self::new(model);
        response.status = ResponseStatus::Failed;
        response.error = Some(ResponseError {
            code: code.to_string(),
            message: message.into(),
        });
        response
    }

    /// Convert an aggregated chat completion into a Responses object
    ///
    /// Only the first choice is converted. Reasoning text becomes a leading
    /// `reasoning` item, content becomes a `message` item and each tool call
    /// becomes a `function_call` item. A `length` finish reason marks the
    /// response incomplete.
    pub fn from_chat_completion(chat: &ChatCompletionResponse) -> Self {
        let mut response = Self::new(chat.model.clone());
        response.id = chat.id.clone();
        response.created_at = chat.created as i64;
        response.usage = Some(ResponseUsage {
            input_tokens: chat.usage.prompt_tokens,
            output_tokens: chat.usage.completion_tokens,
            total_tokens: chat.usage.total_tokens,
        });

        let Some(choice) = chat.choices.first() else {
            return response;
        };

        if let Some(reasoning) = choice
            .message
            .reasoning_content
            .as_deref()
            .filter(|r| !r.is_empty())
        {
            response.output.push(OutputItem::Reasoning(ReasoningItem {
                id: String::new(),
                summary: vec![json!({"type": "summary_text", "text": reasoning})],
            }));
        }

        if let Some(content) = choice.message.content.as_deref().filter(|c| !c.is_empty()) {
            response.output.push(OutputItem::Message(MessageItem {
                id: String::new(),
                role: Role::Assistant,
                status: default_item_status(),
                content: vec![ContentPart::OutputText {
                    text: content.to_string(),
                    annotations: Vec::new(),
                }],
            }));
        }

        for call in choice.message.tool_calls.iter().flatten() {
            response.output.push(OutputItem::FunctionCall(FunctionCallItem {
                id: String::new(),
                call_id: call.id.clone(),
                name: call.function.name.clone(),
                arguments: call.function.arguments.clone(),
                status: default_item_status(),
            }));
        }

        if choice.finish_reason.as_deref() == Some("length") {
            response.status = ResponseStatus::Incomplete;
            response.incomplete_details = Some(json!({"reason": "max_output_tokens"}));
        }

        response
    }
}

/// Convert a canonical Responses request into a canonical chat request
///
/// `instructions` becomes a leading system message, `input` (string or item
/// list) becomes the conversation, `max_output_tokens` maps to `max_tokens`
/// and function tools are rewrapped in the chat `function` envelope.
pub fn responses_request_to_chat(request: &CanonicalRequest) -> CanonicalRequest {
    let mut chat = Map::new();
    let mut messages = Vec::new();

    if let Some(instructions) = request.str("instructions") {
        messages.push(json!({"role": "system", "content": instructions}));
    }

    match request.get("input") {
        Some(Value::String(text)) => messages.push(json!({"role": "user", "content": text})),
        Some(Value::Array(items)) => messages.extend(items.iter().filter_map(input_item_to_message)),
        _ => {}
    }
    chat.insert("messages".to_string(), Value::Array(messages));

    for key in ["model", "temperature", "top_p", "user", "parallel_tool_calls", "stream"] {
        if let Some(value) = request.get(key) {
            chat.insert(key.to_string(), value.clone());
        }
    }
    if let Some(max) = request.get("max_output_tokens") {
        chat.insert("max_tokens".to_string(), max.clone());
    }
    if let Some(Value::Array(tools)) = request.get("tools") {
        let converted: Vec<Value> = tools
            .iter()
            .filter(|t| t.get("type").and_then(Value::as_str) == Some("function"))
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.get("name").cloned().unwrap_or(Value::Null),
                        "description": t.get("description").cloned().unwrap_or(Value::Null),
                        "parameters": t.get("parameters").cloned().unwrap_or_else(|| json!({})),
                    }
                })
            })
            .collect();
        if !converted.is_empty() {
            chat.insert("tools".to_string(), Value::Array(converted));
        }
    }

    CanonicalRequest::new(chat)
}

fn input_item_to_message(item: &Value) -> Option<Value> {
    match item.get("type").and_then(Value::as_str) {
        Some("function_call") => Some(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": item.get("call_id").cloned().unwrap_or(Value::Null),
                "type": "function",
                "function": {
                    "name": item.get("name").cloned().unwrap_or(Value::Null),
                    "arguments": item.get("arguments").cloned().unwrap_or_else(|| json!("{}")),
                }
            }]
        })),
        Some("function_call_output") => Some(json!({
            "role": "tool",
            "tool_call_id": item.get("call_id").cloned().unwrap_or(Value::Null),
            "content": item.get("output").cloned().unwrap_or_else(|| json!("")),
        })),
        Some("message") | None => {
            let role = item.get("role").and_then(Value::as_str).unwrap_or("user");
            let content = match item.get("content") {
                Some(Value::Array(parts)) => Value::Array(
                    parts
                        .iter()
                        .map(|part| match part.get("type").and_then(Value::as_str) {
                            Some("input_image") => json!({
                                "type": "image_url",
                                "image_url": {"url": part.get("image_url").cloned().unwrap_or(Value::Null)}
                            }),
                            _ => json!({
                                "type": "text",
                                "text": part.get("text").cloned().unwrap_or_else(|| json!(""))
                            }),
                        })
                        .collect(),
                ),
                Some(other) => other.clone(),
                None => json!(""),
            };
            Some(json!({"role": role, "content": content}))
        }
        _ => None,
    }
}
