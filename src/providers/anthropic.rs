//! Anthropic Messages API
//!
//! Anthropic keeps the system prompt outside the conversation, requires
//! `max_tokens`, and streams typed events addressing indexed content blocks.
//! Forward mode re-renders those events as OpenAI delta chunks.

use std::sync::Arc;

use serde_json::{json, Value};

use super::{parse_arguments, read_u32, string_or_list, AuthStyle, Provider, ProviderFamily, ProviderInfo};
use crate::accumulate::{
    parse_json, provider_error, AccumulatorState, BlockKind, ProviderStreamAdapter,
};
use crate::mapping::{Operation, ParameterConfig, ProviderSchema};
use crate::native::request::CanonicalRequest;
use crate::native::response::{Delta, ToolCallDelta, ToolCallFunctionDelta, Usage};
use crate::native::streaming::{
    create_chunk_with_metadata, format_sse_chunk, format_sse_done, StreamError,
};
use crate::native::types::{message_text, split_data_url, Role};
use crate::streaming::parse_sse_frame;

/// `max_tokens` sent when the caller gives none
pub const DEFAULT_MAX_TOKENS: u64 = 4096;

const INFO: ProviderInfo = ProviderInfo {
    id: "anthropic",
    display_name: "Anthropic",
    family: ProviderFamily::Anthropic,
    base_url: "https://api.anthropic.com/v1",
    auth: AuthStyle::Header("x-api-key"),
    extra_headers: &[("anthropic-version", "2023-06-01")],
};

pub struct Anthropic {
    chat: ProviderSchema,
}

impl Default for Anthropic {
    fn default() -> Self {
        Self::new()
    }
}

impl Anthropic {
    pub fn new() -> Self {
        Self {
            chat: chat_schema(),
        }
    }
}

impl Provider for Anthropic {
    fn info(&self) -> &ProviderInfo {
        &INFO
    }

    fn schema(&self, operation: Operation) -> Option<&ProviderSchema> {
        (operation == Operation::Chat).then_some(&self.chat)
    }

    fn endpoint(&self, operation: Operation, _model: &str, _stream: bool) -> Option<String> {
        (operation == Operation::Chat).then(|| "/messages".to_string())
    }

    fn stream_adapter(&self, operation: Operation) -> Option<Arc<dyn ProviderStreamAdapter>> {
        (operation == Operation::Chat)
            .then(|| Arc::new(AnthropicEvents) as Arc<dyn ProviderStreamAdapter>)
    }
}

// ============================================================================
// Request schema
// ============================================================================

fn chat_schema() -> ProviderSchema {
    ProviderSchema::new()
        .param("model", ParameterConfig::new("model").required())
        .params(
            "messages",
            vec![
                ParameterConfig::new("messages")
                    .required()
                    .transform(|req: &CanonicalRequest| Some(convert_messages(req.messages()))),
                ParameterConfig::new("system")
                    .transform(|req: &CanonicalRequest| system_prompt(req.messages())),
            ],
        )
        .param(
            "max_tokens",
            ParameterConfig::new("max_tokens").default_with(|req: &CanonicalRequest| {
                Some(
                    req.get("max_completion_tokens")
                        .filter(|v| v.is_number())
                        .cloned()
                        .unwrap_or_else(|| json!(DEFAULT_MAX_TOKENS)),
                )
            }),
        )
        .param("temperature", ParameterConfig::new("temperature").range(0.0, 1.0))
        .param("top_p", ParameterConfig::new("top_p"))
        .param("top_k", ParameterConfig::new("top_k"))
        .param("stream", ParameterConfig::new("stream"))
        .param(
            "stop",
            ParameterConfig::new("stop_sequences")
                .transform(|req: &CanonicalRequest| string_or_list(req.get("stop")?)),
        )
        .param("user", ParameterConfig::new("metadata.user_id"))
        .param(
            "tools",
            ParameterConfig::new("tools")
                .transform(|req: &CanonicalRequest| convert_tools(req.get("tools")?)),
        )
        .param(
            "tool_choice",
            ParameterConfig::new("tool_choice").transform(|req: &CanonicalRequest| {
                convert_tool_choice(req.get("tool_choice")?, req.bool("parallel_tool_calls"))
            }),
        )
}

/// Concatenate system and developer messages
fn system_prompt(messages: &[Value]) -> Option<Value> {
    let texts: Vec<String> = messages
        .iter()
        .filter(|m| Role::of(m).is_instruction())
        .map(message_text)
        .filter(|t| !t.is_empty())
        .collect();
    (!texts.is_empty()).then(|| Value::String(texts.join("\n")))
}

fn image_block(part: &Value) -> Option<Value> {
    let url = match part.get("image_url")? {
        Value::String(url) => url.as_str(),
        other => other.get("url")?.as_str()?,
    };
    let source = match split_data_url(url) {
        Some((media_type, data)) => {
            json!({"type": "base64", "media_type": media_type, "data": data})
        }
        None => json!({"type": "url", "url": url}),
    };
    Some(json!({"type": "image", "source": source}))
}

fn content_blocks(message: &Value) -> Vec<Value> {
    match message.get("content") {
        Some(Value::String(text)) if !text.is_empty() => vec![json!({"type": "text", "text": text})],
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| match part.get("type").and_then(Value::as_str) {
                Some("text") | Some("input_text") => {
                    let text = part.get("text")?.as_str()?;
                    Some(json!({"type": "text", "text": text}))
                }
                Some("image_url") => image_block(part),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn assistant_blocks(message: &Value) -> Vec<Value> {
    let mut blocks = content_blocks(message);
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let function = call.get("function");
            blocks.push(json!({
                "type": "tool_use",
                "id": call.get("id").cloned().unwrap_or(Value::Null),
                "name": function.and_then(|f| f.get("name")).cloned().unwrap_or_default(),
                "input": parse_arguments(function.and_then(|f| f.get("arguments"))),
            }));
        }
    }
    blocks
}

/// Convert canonical messages into alternating Anthropic turns
///
/// Tool results become user turns; consecutive turns of the same role are
/// merged into one.
fn convert_messages(messages: &[Value]) -> Value {
    let mut turns: Vec<Value> = Vec::new();

    for message in messages {
        let (role, blocks) = match Role::of(message) {
            Role::System | Role::Developer => continue,
            Role::User => ("user", content_blocks(message)),
            Role::Assistant => ("assistant", assistant_blocks(message)),
            Role::Tool => (
                "user",
                vec![json!({
                    "type": "tool_result",
                    "tool_use_id": message.get("tool_call_id").cloned().unwrap_or(Value::Null),
                    "content": message_text(message),
                })],
            ),
        };
        if blocks.is_empty() {
            continue;
        }

        match turns.last_mut() {
            Some(last) if last["role"] == role => {
                if let Some(content) = last.get_mut("content").and_then(Value::as_array_mut) {
                    content.extend(blocks);
                }
            }
            _ => turns.push(json!({"role": role, "content": blocks})),
        }
    }

    Value::Array(turns)
}

fn convert_tools(tools: &Value) -> Option<Value> {
    let converted: Vec<Value> = tools
        .as_array()?
        .iter()
        .filter_map(|tool| {
            let function = tool.get("function")?;
            let mut out = json!({
                "name": function.get("name")?,
                "input_schema": function
                    .get("parameters")
                    .cloned()
                    .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
            });
            if let Some(description) = function.get("description") {
                out["description"] = description.clone();
            }
            Some(out)
        })
        .collect();
    (!converted.is_empty()).then_some(Value::Array(converted))
}

fn convert_tool_choice(choice: &Value, parallel: Option<bool>) -> Option<Value> {
    let mut out = match choice {
        Value::String(mode) => match mode.as_str() {
            "auto" => json!({"type": "auto"}),
            "required" => json!({"type": "any"}),
            "none" => json!({"type": "none"}),
            _ => return None,
        },
        Value::Object(_) => {
            let name = choice.get("function")?.get("name")?;
            json!({"type": "tool", "name": name})
        }
        _ => return None,
    };
    if parallel == Some(false) && out["type"] != "none" {
        out["disable_parallel_tool_use"] = Value::Bool(true);
    }
    Some(out)
}

/// Map an Anthropic stop reason to the canonical finish reason
pub fn finish_reason(stop_reason: &str) -> &'static str {
    match stop_reason {
        "max_tokens" => "length",
        "tool_use" => "tool_calls",
        "refusal" => "content_filter",
        _ => "stop",
    }
}

// ============================================================================
// Stream protocol
// ============================================================================

/// What one event contributes to a forward stream
enum Emit {
    Start,
    Text(String),
    Reasoning(String),
    ToolStart { index: u32, id: String, name: String },
    ToolArguments { index: u32, arguments: String },
    Finish(String),
    Stop,
    Nothing,
}

/// Anthropic event stream adapter
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicEvents;

fn block_index(payload: &Value) -> u32 {
    payload.get("index").and_then(Value::as_u64).unwrap_or(0) as u32
}

/// Tool-call index for a content block, assigning the next one if new
fn tool_index(state: &mut AccumulatorState, block: u32) -> u32 {
    if let Some(BlockKind::ToolUse(index)) = state.blocks.get(&block) {
        return *index;
    }
    let next = state
        .blocks
        .values()
        .filter(|kind| matches!(kind, BlockKind::ToolUse(_)))
        .count() as u32;
    state.blocks.insert(block, BlockKind::ToolUse(next));
    next
}

fn apply(state: &mut AccumulatorState, frame: &str) -> Result<Emit, StreamError> {
    let sse = parse_sse_frame(frame);
    if sse.data.is_empty() {
        return Ok(Emit::Nothing);
    }
    let payload = parse_json(&sse.data)?;
    let kind = payload
        .get("type")
        .and_then(Value::as_str)
        .or(sse.event.as_deref())
        .unwrap_or_default();

    match kind {
        "error" => Err(provider_error(&payload).unwrap_or_else(|| StreamError::ProviderError {
            message: payload.to_string(),
            code: None,
        })),
        "message_start" => {
            let message = &payload["message"];
            state.observe(
                message.get("id").and_then(Value::as_str),
                message.get("model").and_then(Value::as_str),
                None,
            );
            let usage = &message["usage"];
            state.record_usage(Usage::new(
                read_u32(usage, "input_tokens"),
                read_u32(usage, "output_tokens"),
            ));
            state.choice_mut(0).role = Some(Role::Assistant);
            Ok(Emit::Start)
        }
        "content_block_start" => {
            let index = block_index(&payload);
            let block = &payload["content_block"];
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    state.blocks.insert(index, BlockKind::Text);
                    let text = block.get("text").and_then(Value::as_str).unwrap_or_default();
                    if text.is_empty() {
                        return Ok(Emit::Nothing);
                    }
                    state.push_content(0, text);
                    state.count_delta_frame();
                    Ok(Emit::Text(text.to_string()))
                }
                Some("thinking") => {
                    state.blocks.insert(index, BlockKind::Thinking);
                    Ok(Emit::Nothing)
                }
                Some("tool_use") => {
                    let call = tool_index(state, index);
                    let id = block.get("id").and_then(Value::as_str).unwrap_or_default();
                    let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
                    state.push_tool_call(0, call, Some(id), Some(name), "");
                    Ok(Emit::ToolStart {
                        index: call,
                        id: id.to_string(),
                        name: name.to_string(),
                    })
                }
                _ => Ok(Emit::Nothing),
            }
        }
        "content_block_delta" => {
            let index = block_index(&payload);
            let delta = &payload["delta"];
            match delta.get("type").and_then(Value::as_str) {
                Some("text_delta") => {
                    let text = delta.get("text").and_then(Value::as_str).unwrap_or_default();
                    state.push_content(0, text);
                    state.count_delta_frame();
                    Ok(Emit::Text(text.to_string()))
                }
                Some("thinking_delta") => {
                    let text = delta.get("thinking").and_then(Value::as_str).unwrap_or_default();
                    state.push_reasoning(0, text);
                    Ok(Emit::Reasoning(text.to_string()))
                }
                Some("input_json_delta") => {
                    let call = tool_index(state, index);
                    let arguments = delta
                        .get("partial_json")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    state.push_tool_call(0, call, None, None, arguments);
                    Ok(Emit::ToolArguments {
                        index: call,
                        arguments: arguments.to_string(),
                    })
                }
                _ => Ok(Emit::Nothing),
            }
        }
        "message_delta" => {
            let prompt = state.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0);
            if let Some(usage) = payload.get("usage").filter(|u| u.is_object()) {
                let prompt = match read_u32(usage, "input_tokens") {
                    0 => prompt,
                    reported => reported,
                };
                state.record_usage(Usage::new(prompt, read_u32(usage, "output_tokens")));
            }
            match payload["delta"].get("stop_reason").and_then(Value::as_str) {
                Some(reason) => {
                    let reason = finish_reason(reason);
                    state.set_finish_reason(0, reason);
                    Ok(Emit::Finish(reason.to_string()))
                }
                None => Ok(Emit::Nothing),
            }
        }
        "message_stop" => Ok(Emit::Stop),
        _ => Ok(Emit::Nothing),
    }
}

fn tool_delta(index: u32, id: Option<String>, name: Option<String>, arguments: String) -> Delta {
    Delta::tool_calls(vec![ToolCallDelta {
        index,
        call_type: id.as_ref().map(|_| "function".to_string()),
        id,
        function: Some(ToolCallFunctionDelta {
            name,
            arguments: Some(arguments),
        }),
    }])
}

impl ProviderStreamAdapter for AnthropicEvents {
    fn provider(&self) -> &str {
        INFO.id
    }

    fn frame_to_chunk(
        &self,
        frame: &str,
        state: &mut AccumulatorState,
    ) -> Result<Option<String>, StreamError> {
        let (delta, finish) = match apply(state, frame)? {
            Emit::Start => (Delta::assistant(), None),
            Emit::Text(text) => (Delta::content(text), None),
            Emit::Reasoning(text) => (Delta::reasoning(text), None),
            Emit::ToolStart { index, id, name } => (tool_delta(index, Some(id), Some(name), String::new()), None),
            Emit::ToolArguments { index, arguments } => (tool_delta(index, None, None, arguments), None),
            Emit::Finish(reason) => (Delta::default(), Some(reason)),
            Emit::Stop => return Ok(Some(format_sse_done())),
            Emit::Nothing => return Ok(None),
        };

        let usage = finish.as_ref().map(|_| state.final_usage());
        let chunk = create_chunk_with_metadata(&state.metadata(), 0, delta, finish, usage);
        Ok(Some(format_sse_chunk(&chunk)))
    }

    fn fold_frame(&self, state: &mut AccumulatorState, frame: &str) -> Result<(), StreamError> {
        apply(state, frame).map(|_| ())
    }
}
