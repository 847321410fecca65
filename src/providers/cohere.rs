//! Cohere chat (v1)
//!
//! Cohere takes the newest user turn as `message` and everything before it
//! as `chat_history`. Streams are newline-delimited JSON events; the final
//! `is_finished` event carries the complete response, which is what
//! aggregate mode returns.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use super::{parse_arguments, read_u32, string_or_list, AuthStyle, Provider, ProviderFamily, ProviderInfo};
use crate::accumulate::{
    parse_json, provider_error, AccumulatorState, Aggregate, ProviderStreamAdapter, ToolCallState,
};
use crate::mapping::{Operation, ParameterConfig, ProviderSchema};
use crate::native::request::CanonicalRequest;
use crate::native::response::{Delta, ToolCallDelta, ToolCallFunctionDelta, Usage};
use crate::native::streaming::{create_chunk_with_metadata, format_sse_chunk, StreamError};
use crate::native::types::{message_text, Role};
use crate::streaming::parse_sse_frame;

const INFO: ProviderInfo = ProviderInfo {
    id: "cohere",
    display_name: "Cohere",
    family: ProviderFamily::Cohere,
    base_url: "https://api.cohere.ai/v1",
    auth: AuthStyle::Bearer,
    extra_headers: &[],
};

const EMBEDDING_TYPES: &[&str] = &["float", "int8", "uint8", "binary", "ubinary"];

pub struct Cohere {
    chat: ProviderSchema,
    embed: ProviderSchema,
}

impl Default for Cohere {
    fn default() -> Self {
        Self::new()
    }
}

impl Cohere {
    pub fn new() -> Self {
        Self {
            chat: chat_schema(),
            embed: embed_schema(),
        }
    }
}

impl Provider for Cohere {
    fn info(&self) -> &ProviderInfo {
        &INFO
    }

    fn schema(&self, operation: Operation) -> Option<&ProviderSchema> {
        match operation {
            Operation::Chat => Some(&self.chat),
            Operation::Embed => Some(&self.embed),
            _ => None,
        }
    }

    fn endpoint(&self, operation: Operation, _model: &str, _stream: bool) -> Option<String> {
        match operation {
            Operation::Chat => Some("/chat".to_string()),
            Operation::Embed => Some("/embed".to_string()),
            _ => None,
        }
    }

    fn stream_adapter(&self, operation: Operation) -> Option<Arc<dyn ProviderStreamAdapter>> {
        (operation == Operation::Chat)
            .then(|| Arc::new(CohereEvents) as Arc<dyn ProviderStreamAdapter>)
    }
}

// ============================================================================
// Request schema
// ============================================================================

fn chat_schema() -> ProviderSchema {
    ProviderSchema::new()
        .passthrough(&["seed", "presence_penalty", "frequency_penalty", "stream", "response_format"])
        .param("model", ParameterConfig::new("model").required())
        .params(
            "messages",
            vec![
                ParameterConfig::new("message")
                    .required()
                    .transform(|req: &CanonicalRequest| Some(current_message(req.messages()))),
                ParameterConfig::new("chat_history")
                    .transform(|req: &CanonicalRequest| chat_history(req.messages())),
                ParameterConfig::new("tool_results")
                    .transform(|req: &CanonicalRequest| tool_results(req.messages())),
                ParameterConfig::new("preamble").transform(|req: &CanonicalRequest| {
                    let preamble: Vec<String> = req
                        .messages()
                        .iter()
                        .filter(|m| Role::of(m).is_instruction())
                        .map(message_text)
                        .filter(|t| !t.is_empty())
                        .collect();
                    (!preamble.is_empty()).then(|| Value::String(preamble.join("\n")))
                }),
            ],
        )
        .param(
            "max_tokens",
            ParameterConfig::new("max_tokens").default_with(|req: &CanonicalRequest| {
                req.get("max_completion_tokens").filter(|v| v.is_number()).cloned()
            }),
        )
        .param("temperature", ParameterConfig::new("temperature").range(0.0, 1.0))
        .param("top_p", ParameterConfig::new("p").range(0.01, 0.99))
        .param("top_k", ParameterConfig::new("k").range(0.0, 500.0))
        .param(
            "stop",
            ParameterConfig::new("stop_sequences")
                .transform(|req: &CanonicalRequest| string_or_list(req.get("stop")?)),
        )
        .param(
            "tools",
            ParameterConfig::new("tools")
                .transform(|req: &CanonicalRequest| convert_tools(req.get("tools")?)),
        )
}

fn embed_schema() -> ProviderSchema {
    ProviderSchema::new()
        .param("model", ParameterConfig::new("model").required())
        .param(
            "input",
            ParameterConfig::new("texts")
                .required()
                .transform(|req: &CanonicalRequest| string_or_list(req.get("input")?)),
        )
        .param(
            "input_type",
            ParameterConfig::new("input_type").default_value(json!("search_document")),
        )
        .param(
            "encoding_format",
            ParameterConfig::new("embedding_types").transform(|req: &CanonicalRequest| {
                let format = req.str("encoding_format")?;
                EMBEDDING_TYPES.contains(&format).then(|| json!([format]))
            }),
        )
}

/// Messages that form the conversation, without instructions
fn turns(messages: &[Value]) -> Vec<&Value> {
    messages.iter().filter(|m| !Role::of(m).is_instruction()).collect()
}

/// Number of tool results at the end of the conversation
fn trailing_tool_results(turns: &[&Value]) -> usize {
    turns.iter().rev().take_while(|m| Role::of(m) == Role::Tool).count()
}

/// Split point between history and the current turn
fn history_len(turns: &[&Value]) -> usize {
    let trailing = trailing_tool_results(turns);
    if trailing > 0 {
        return turns.len() - trailing;
    }
    match turns.last() {
        Some(last) if Role::of(last) == Role::User => turns.len() - 1,
        _ => turns.len(),
    }
}

/// Text of the newest user turn
///
/// Empty when the conversation ends in tool results.
fn current_message(messages: &[Value]) -> Value {
    let turns = turns(messages);
    if trailing_tool_results(&turns) > 0 {
        return Value::String(String::new());
    }
    match turns.last() {
        Some(last) if Role::of(last) == Role::User => Value::String(message_text(last)),
        _ => Value::String(String::new()),
    }
}

fn chat_history(messages: &[Value]) -> Option<Value> {
    let turns = turns(messages);
    let history: Vec<Value> = turns[..history_len(&turns)]
        .iter()
        .filter_map(|message| {
            let role = match Role::of(message) {
                Role::User => "USER",
                Role::Assistant => "CHATBOT",
                Role::Tool => "TOOL",
                Role::System | Role::Developer => return None,
            };
            let mut entry = json!({"role": role, "message": message_text(message)});
            if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
                entry["tool_calls"] = Value::Array(calls.iter().map(cohere_call).collect());
            }
            Some(entry)
        })
        .collect();
    (!history.is_empty()).then_some(Value::Array(history))
}

fn cohere_call(call: &Value) -> Value {
    let function = call.get("function");
    json!({
        "name": function.and_then(|f| f.get("name")).cloned().unwrap_or_default(),
        "parameters": parse_arguments(function.and_then(|f| f.get("arguments"))),
    })
}

/// Trailing tool messages paired with the calls they answer
fn tool_results(messages: &[Value]) -> Option<Value> {
    let turns = turns(messages);
    let trailing = trailing_tool_results(&turns);
    if trailing == 0 {
        return None;
    }

    let calls: Vec<&Value> = turns
        .iter()
        .filter_map(|m| m.get("tool_calls").and_then(Value::as_array))
        .flatten()
        .collect();

    let results: Vec<Value> = turns[turns.len() - trailing..]
        .iter()
        .map(|result| {
            let id = result.get("tool_call_id").and_then(Value::as_str);
            let call = calls
                .iter()
                .find(|c| c.get("id").and_then(Value::as_str) == id)
                .map(|c| cohere_call(c))
                .unwrap_or_else(|| json!({"name": "", "parameters": {}}));
            let output = serde_json::from_str::<Value>(&message_text(result))
                .ok()
                .filter(Value::is_object)
                .unwrap_or_else(|| json!({"result": message_text(result)}));
            json!({"call": call, "outputs": [output]})
        })
        .collect();
    Some(Value::Array(results))
}

/// Convert JSON-schema tool parameters into Cohere parameter definitions
fn convert_tools(tools: &Value) -> Option<Value> {
    let converted: Vec<Value> = tools
        .as_array()?
        .iter()
        .filter_map(|tool| {
            let function = tool.get("function")?;
            let parameters = function.get("parameters");
            let required: Vec<&str> = parameters
                .and_then(|p| p.get("required"))
                .and_then(Value::as_array)
                .map(|r| r.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();

            let mut definitions = Map::new();
            if let Some(properties) = parameters
                .and_then(|p| p.get("properties"))
                .and_then(Value::as_object)
            {
                for (name, property) in properties {
                    let mut definition = json!({
                        "type": property.get("type").cloned().unwrap_or_else(|| json!("str")),
                        "required": required.contains(&name.as_str()),
                    });
                    if let Some(description) = property.get("description") {
                        definition["description"] = description.clone();
                    }
                    definitions.insert(name.clone(), definition);
                }
            }

            Some(json!({
                "name": function.get("name")?,
                "description": function.get("description").cloned().unwrap_or_default(),
                "parameter_definitions": definitions,
            }))
        })
        .collect();
    (!converted.is_empty()).then_some(Value::Array(converted))
}

/// Map a Cohere finish reason to the canonical finish reason
pub fn finish_reason(reason: &str) -> &'static str {
    match reason {
        "MAX_TOKENS" | "ERROR_LIMIT" => "length",
        "ERROR_TOXIC" => "content_filter",
        _ => "stop",
    }
}

// ============================================================================
// Stream protocol
// ============================================================================

/// Cohere JSON-lines event stream adapter
#[derive(Debug, Clone, Copy, Default)]
pub struct CohereEvents;

fn read_usage(meta: &Value) -> Option<Usage> {
    let units = meta
        .get("billed_units")
        .or_else(|| meta.get("tokens"))
        .filter(|u| u.is_object())?;
    Some(Usage::new(
        read_u32(units, "input_tokens"),
        read_u32(units, "output_tokens"),
    ))
}

/// Payload of one event, or an error for failure events
fn event(frame: &str) -> Result<Option<Value>, StreamError> {
    let sse = parse_sse_frame(frame);
    if sse.is_done() || sse.data.is_empty() {
        return Ok(None);
    }
    let payload = parse_json(&sse.data)?;
    if let Some(err) = provider_error(&payload) {
        return Err(err);
    }
    if payload.get("is_finished").and_then(Value::as_bool) == Some(true)
        && payload.get("finish_reason").and_then(Value::as_str) == Some("ERROR")
    {
        let message = payload
            .get("response")
            .and_then(|r| r.get("text"))
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .unwrap_or("Cohere stream ended with an error");
        return Err(StreamError::ProviderError {
            message: message.to_string(),
            code: Some("ERROR".to_string()),
        });
    }
    Ok(Some(payload))
}

fn event_type(payload: &Value) -> &str {
    payload.get("event_type").and_then(Value::as_str).unwrap_or_default()
}

/// Rebuild choice 0 from the terminal response
fn apply_terminal(state: &mut AccumulatorState, terminal: &Value) {
    let response = terminal.get("response").unwrap_or(terminal);
    state.observe(
        response
            .get("generation_id")
            .or_else(|| response.get("response_id"))
            .and_then(Value::as_str),
        None,
        None,
    );
    if let Some(usage) = response.get("meta").and_then(read_usage) {
        state.record_usage(usage);
    }

    let choice = state.choice_mut(0);
    choice.role = Some(Role::Assistant);
    if let Some(text) = response.get("text").and_then(Value::as_str) {
        choice.content = text.to_string();
    }

    let calls: BTreeMap<u32, ToolCallState> = response
        .get("tool_calls")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .enumerate()
        .map(|(index, call)| {
            let call_state = ToolCallState {
                id: None,
                name: call.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                arguments: call.get("parameters").cloned().unwrap_or_else(|| json!({})).to_string(),
            };
            (index as u32, call_state)
        })
        .collect();
    if !calls.is_empty() {
        choice.tool_calls = calls;
    }

    let reason = terminal.get("finish_reason").and_then(Value::as_str).map(finish_reason);
    choice.finish_reason = match reason {
        Some("stop") if !choice.tool_calls.is_empty() => Some("tool_calls".to_string()),
        other => other.map(str::to_string),
    };
}

impl ProviderStreamAdapter for CohereEvents {
    fn provider(&self) -> &str {
        INFO.id
    }

    fn delimiter(&self) -> &'static str {
        "\n"
    }

    fn frame_to_chunk(
        &self,
        frame: &str,
        state: &mut AccumulatorState,
    ) -> Result<Option<String>, StreamError> {
        let Some(payload) = event(frame)? else {
            return Ok(None);
        };

        let kind = event_type(&payload).to_string();
        let (delta, finish) = match kind.as_str() {
            "stream-start" => {
                state.observe(payload.get("generation_id").and_then(Value::as_str), None, None);
                state.choice_mut(0).role = Some(Role::Assistant);
                (Delta::assistant(), None)
            }
            "text-generation" => {
                let text = payload.get("text").and_then(Value::as_str).unwrap_or_default();
                state.push_content(0, text);
                state.count_delta_frame();
                (Delta::content(text), None)
            }
            "tool-calls-generation" => {
                let mut deltas = Vec::new();
                for call in payload.get("tool_calls").and_then(Value::as_array).into_iter().flatten() {
                    let index = state.choice_mut(0).tool_calls.len() as u32;
                    let id = format!("call_{}", uuid::Uuid::new_v4().simple());
                    let name = call.get("name").and_then(Value::as_str).unwrap_or_default();
                    let arguments = call.get("parameters").cloned().unwrap_or_else(|| json!({})).to_string();
                    state.push_tool_call(0, index, Some(&id), Some(name), &arguments);
                    deltas.push(ToolCallDelta {
                        index,
                        id: Some(id),
                        call_type: Some("function".to_string()),
                        function: Some(ToolCallFunctionDelta {
                            name: Some(name.to_string()),
                            arguments: Some(arguments),
                        }),
                    });
                }
                if deltas.is_empty() {
                    return Ok(None);
                }
                (Delta::tool_calls(deltas), None)
            }
            "stream-end" => {
                if let Some(usage) = payload
                    .get("response")
                    .and_then(|r| r.get("meta"))
                    .and_then(read_usage)
                {
                    state.record_usage(usage);
                }
                let has_tools = state.choices.get(&0).is_some_and(|c| !c.tool_calls.is_empty());
                let reason = match payload.get("finish_reason").and_then(Value::as_str).map(finish_reason) {
                    Some("stop") | None if has_tools => "tool_calls",
                    Some(reason) => reason,
                    None => "stop",
                };
                state.set_finish_reason(0, reason);
                state.terminal = Some(payload);
                (Delta::default(), Some(reason.to_string()))
            }
            _ => return Ok(None),
        };

        let usage = finish.as_ref().map(|_| state.final_usage());
        let chunk = create_chunk_with_metadata(&state.metadata(), 0, delta, finish, usage);
        Ok(Some(format_sse_chunk(&chunk)))
    }

    fn fold_frame(&self, state: &mut AccumulatorState, frame: &str) -> Result<(), StreamError> {
        let Some(payload) = event(frame)? else {
            return Ok(());
        };

        if payload.get("is_finished").and_then(Value::as_bool) == Some(true) {
            state.terminal = Some(payload);
            return Ok(());
        }

        match event_type(&payload) {
            "stream-start" => {
                state.observe(payload.get("generation_id").and_then(Value::as_str), None, None);
            }
            "text-generation" => {
                let text = payload.get("text").and_then(Value::as_str).unwrap_or_default();
                state.push_content(0, text);
                state.count_delta_frame();
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(&self, mut state: AccumulatorState) -> Aggregate {
        if let Some(terminal) = state.terminal.take() {
            apply_terminal(&mut state, &terminal);
        }
        Aggregate::Chat(state.into_chat_completion())
    }

    fn appends_done(&self) -> bool {
        true
    }
}
