//! Google Gemini
//!
//! Gemini puts the model in the URL, nests sampling parameters under
//! `generationConfig` and streams candidate snapshots. A snapshot can carry
//! either the new text or everything produced so far, so folding diffs each
//! part against the same part of the candidate's previous snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};

use super::{
    parse_arguments, read_u32, string_or_list, AuthStyle, Provider, ProviderFamily, ProviderInfo,
};
use crate::accumulate::{
    parse_json, provider_error, AccumulatorState, CandidateSnapshot, Pacing, ProviderStreamAdapter,
    SnapshotPart,
};
use crate::mapping::{clamp_number, Operation, ParameterConfig, ProviderSchema, RuleRef};
use crate::native::request::CanonicalRequest;
use crate::native::response::{Delta, ToolCallDelta, ToolCallFunctionDelta, Usage};
use crate::native::streaming::{create_chunk_with_metadata, format_sse_chunk, StreamError};
use crate::native::types::{message_text, split_data_url, Role};
use crate::streaming::parse_sse_frame;

const INFO: ProviderInfo = ProviderInfo {
    id: "google",
    display_name: "Google Gemini",
    family: ProviderFamily::Google,
    base_url: "https://generativelanguage.googleapis.com/v1beta",
    auth: AuthStyle::Header("x-goog-api-key"),
    extra_headers: &[],
};

/// Canonical keys that feed `generationConfig`
const GENERATION_KEYS: &[&str] = &[
    "temperature",
    "top_p",
    "top_k",
    "max_tokens",
    "max_completion_tokens",
    "stop",
    "n",
    "seed",
    "presence_penalty",
    "frequency_penalty",
    "response_format",
];

pub struct Google {
    chat: ProviderSchema,
    embed: ProviderSchema,
}

impl Default for Google {
    fn default() -> Self {
        Self::new()
    }
}

impl Google {
    pub fn new() -> Self {
        Self {
            chat: chat_schema(),
            embed: embed_schema(),
        }
    }
}

impl Provider for Google {
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

    fn endpoint(&self, operation: Operation, model: &str, stream: bool) -> Option<String> {
        match operation {
            Operation::Chat if stream => Some(format!("/models/{}:streamGenerateContent?alt=sse", model)),
            Operation::Chat => Some(format!("/models/{}:generateContent", model)),
            Operation::Embed => Some(format!("/models/{}:embedContent", model)),
            _ => None,
        }
    }

    fn stream_adapter(&self, operation: Operation) -> Option<Arc<dyn ProviderStreamAdapter>> {
        (operation == Operation::Chat)
            .then(|| Arc::new(GoogleSnapshots) as Arc<dyn ProviderStreamAdapter>)
    }
}

// ============================================================================
// Request schema
// ============================================================================

fn chat_schema() -> ProviderSchema {
    let generation = RuleRef::new(generation_config);

    let mut schema = ProviderSchema::new()
        // The model travels in the URL
        .param(
            "model",
            ParameterConfig::new("model")
                .required()
                .transform(|_: &CanonicalRequest| -> Option<Value> { None }),
        )
        .params(
            "messages",
            vec![
                ParameterConfig::new("contents")
                    .required()
                    .transform(|req: &CanonicalRequest| Some(convert_contents(req.messages()))),
                ParameterConfig::new("systemInstruction")
                    .transform(|req: &CanonicalRequest| system_instruction(req.messages())),
            ],
        )
        .param(
            "tools",
            ParameterConfig::new("tools")
                .transform(|req: &CanonicalRequest| convert_tools(req.get("tools")?)),
        )
        .param(
            "tool_choice",
            ParameterConfig::new("toolConfig")
                .transform(|req: &CanonicalRequest| convert_tool_choice(req.get("tool_choice")?)),
        );

    for key in GENERATION_KEYS {
        let mut config = ParameterConfig::new("generationConfig").transform_ref(generation.clone());
        if *key == "temperature" {
            config = config.range(0.0, 2.0);
        }
        schema = schema.param(*key, config);
    }
    schema
}

fn embed_schema() -> ProviderSchema {
    ProviderSchema::new()
        .param(
            "model",
            ParameterConfig::new("model")
                .required()
                .transform(|req: &CanonicalRequest| Some(json!(format!("models/{}", req.model()?)))),
        )
        .param(
            "input",
            ParameterConfig::new("content")
                .required()
                .transform(|req: &CanonicalRequest| embed_content(req.get("input")?)),
        )
        .param("dimensions", ParameterConfig::new("outputDimensionality"))
}

fn embed_content(input: &Value) -> Option<Value> {
    let parts: Vec<Value> = match input {
        Value::String(text) => vec![json!({"text": text})],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|text| json!({"text": text}))
            .collect(),
        _ => return None,
    };
    Some(json!({"parts": parts}))
}

/// Recompute the whole `generationConfig` object from the request
///
/// Every generation key shares this rule, so whichever key is mapped last
/// writes the same object.
fn generation_config(req: &CanonicalRequest) -> Option<Value> {
    let mut config = Map::new();
    let mut copy = |key: &str, target: &str| {
        if let Some(value) = req.get(key).filter(|v| !v.is_null()) {
            config.insert(target.to_string(), value.clone());
        }
    };
    copy("temperature", "temperature");
    copy("top_p", "topP");
    copy("top_k", "topK");
    copy("n", "candidateCount");
    copy("seed", "seed");
    copy("presence_penalty", "presencePenalty");
    copy("frequency_penalty", "frequencyPenalty");

    let clamped = config
        .get("temperature")
        .and_then(|t| clamp_number(t, Some(0.0), Some(2.0)));
    if let Some(clamped) = clamped {
        config.insert("temperature".to_string(), clamped);
    }

    let max_tokens = req
        .get("max_completion_tokens")
        .filter(|v| v.is_number())
        .or_else(|| req.get("max_tokens").filter(|v| v.is_number()));
    if let Some(max_tokens) = max_tokens {
        config.insert("maxOutputTokens".to_string(), max_tokens.clone());
    }

    if let Some(stop) = req.get("stop").and_then(string_or_list) {
        config.insert("stopSequences".to_string(), stop);
    }

    if let Some(format) = req.get("response_format") {
        match format.get("type").and_then(Value::as_str) {
            Some("json_object") => {
                config.insert("responseMimeType".to_string(), json!("application/json"));
            }
            Some("json_schema") => {
                config.insert("responseMimeType".to_string(), json!("application/json"));
                if let Some(schema) = format.get("json_schema").and_then(|s| s.get("schema")) {
                    config.insert("responseSchema".to_string(), schema.clone());
                }
            }
            _ => {}
        }
    }

    (!config.is_empty()).then_some(Value::Object(config))
}

fn system_instruction(messages: &[Value]) -> Option<Value> {
    let parts: Vec<Value> = messages
        .iter()
        .filter(|m| Role::of(m).is_instruction())
        .map(message_text)
        .filter(|t| !t.is_empty())
        .map(|text| json!({"text": text}))
        .collect();
    (!parts.is_empty()).then(|| json!({"parts": parts}))
}

fn user_parts(message: &Value) -> Vec<Value> {
    match message.get("content") {
        Some(Value::String(text)) if !text.is_empty() => vec![json!({"text": text})],
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| match part.get("type").and_then(Value::as_str) {
                Some("text") | Some("input_text") => Some(json!({"text": part.get("text")?})),
                Some("image_url") => {
                    let url = match part.get("image_url")? {
                        Value::String(url) => url.as_str(),
                        other => other.get("url")?.as_str()?,
                    };
                    Some(match split_data_url(url) {
                        Some((mime, data)) => json!({"inlineData": {"mimeType": mime, "data": data}}),
                        None => json!({"fileData": {"fileUri": url}}),
                    })
                }
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Convert canonical messages into Gemini `contents`
///
/// Tool results are answered as `functionResponse` parts named after the
/// call they answer; consecutive turns of the same role are merged.
fn convert_contents(messages: &[Value]) -> Value {
    let mut call_names: HashMap<String, String> = HashMap::new();
    let mut contents: Vec<Value> = Vec::new();

    for message in messages {
        let (role, parts) = match Role::of(message) {
            Role::System | Role::Developer => continue,
            Role::User => ("user", user_parts(message)),
            Role::Assistant => {
                let mut parts = user_parts(message);
                let calls = message.get("tool_calls").and_then(Value::as_array);
                for call in calls.into_iter().flatten() {
                    let function = call.get("function");
                    let name = function
                        .and_then(|f| f.get("name"))
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    if let Some(id) = call.get("id").and_then(Value::as_str) {
                        call_names.insert(id.to_string(), name.to_string());
                    }
                    parts.push(json!({"functionCall": {
                        "name": name,
                        "args": parse_arguments(function.and_then(|f| f.get("arguments"))),
                    }}));
                }
                ("model", parts)
            }
            Role::Tool => {
                let name = message
                    .get("tool_call_id")
                    .and_then(Value::as_str)
                    .and_then(|id| call_names.get(id))
                    .cloned()
                    .or_else(|| message.get("name").and_then(Value::as_str).map(str::to_string))
                    .unwrap_or_default();
                (
                    "user",
                    vec![json!({"functionResponse": {
                        "name": name,
                        "response": {"content": message_text(message)},
                    }})],
                )
            }
        };
        if parts.is_empty() {
            continue;
        }

        match contents.last_mut() {
            Some(last) if last["role"] == role => {
                if let Some(existing) = last.get_mut("parts").and_then(Value::as_array_mut) {
                    existing.extend(parts);
                }
            }
            _ => contents.push(json!({"role": role, "parts": parts})),
        }
    }

    Value::Array(contents)
}

fn convert_tools(tools: &Value) -> Option<Value> {
    let declarations: Vec<Value> = tools
        .as_array()?
        .iter()
        .filter_map(|tool| {
            let function = tool.get("function")?;
            let mut declaration = json!({"name": function.get("name")?});
            for key in ["description", "parameters"] {
                if let Some(value) = function.get(key) {
                    declaration[key] = value.clone();
                }
            }
            Some(declaration)
        })
        .collect();
    (!declarations.is_empty()).then(|| json!([{"functionDeclarations": declarations}]))
}

fn convert_tool_choice(choice: &Value) -> Option<Value> {
    let config = match choice {
        Value::String(mode) => match mode.as_str() {
            "auto" => json!({"mode": "AUTO"}),
            "required" => json!({"mode": "ANY"}),
            "none" => json!({"mode": "NONE"}),
            _ => return None,
        },
        Value::Object(_) => {
            let name = choice.get("function")?.get("name")?;
            json!({"mode": "ANY", "allowedFunctionNames": [name]})
        }
        _ => return None,
    };
    Some(json!({"functionCallingConfig": config}))
}

/// Map a Gemini finish reason to the canonical finish reason
pub fn finish_reason(reason: &str) -> &'static str {
    match reason {
        "MAX_TOKENS" => "length",
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => "content_filter",
        _ => "stop",
    }
}

// ============================================================================
// Stream protocol
// ============================================================================

/// Part of `snapshot` not yet in `existing`
///
/// A snapshot extending the existing part text contributes its suffix;
/// anything else is new text and contributes all of it.
pub fn snapshot_suffix<'a>(existing: &str, snapshot: &'a str) -> &'a str {
    if !existing.is_empty() && snapshot.starts_with(existing) {
        &snapshot[existing.len()..]
    } else {
        snapshot
    }
}

/// What one snapshot frame added to one candidate
#[derive(Debug, Default)]
struct CandidateUpdate {
    index: u32,
    first: bool,
    content: String,
    reasoning: String,
    tool_calls: Vec<ToolCallDelta>,
    finish_reason: Option<String>,
}

/// Gemini candidate snapshot adapter
#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleSnapshots;

fn snapshot_part(part: &Value) -> Option<SnapshotPart> {
    if let Some(call) = part.get("functionCall") {
        return Some(SnapshotPart::Call {
            name: call.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            arguments: call.get("args").cloned().unwrap_or_else(|| json!({})).to_string(),
        });
    }
    part.get("text").and_then(Value::as_str).map(|text| SnapshotPart::Text {
        thought: part.get("thought").and_then(Value::as_bool).unwrap_or(false),
        text: text.to_string(),
    })
}

/// Whether `parts` repeats the previous snapshot and extends it
///
/// Every previous part must reappear at its index: text as a prefix of the
/// same kind of text, calls unchanged. Equal text alone proves nothing, so
/// the frame also has to grow a part, add one, repeat a call, or follow a
/// frame already known to be cumulative.
fn continues(previous: &CandidateSnapshot, parts: &[SnapshotPart]) -> bool {
    if previous.parts.is_empty() || parts.len() < previous.parts.len() {
        return false;
    }
    let mut extended = parts.len() > previous.parts.len();
    for (old, new) in previous.parts.iter().zip(parts) {
        match (old, new) {
            (
                SnapshotPart::Text { thought: a, text: before },
                SnapshotPart::Text { thought: b, text: after },
            ) if a == b && after.starts_with(before.as_str()) => {
                extended |= after.len() > before.len();
            }
            (SnapshotPart::Call { .. }, SnapshotPart::Call { .. }) if old == new => {
                extended = true;
            }
            _ => return false,
        }
    }
    extended || previous.cumulative
}

fn fold_candidate(state: &mut AccumulatorState, candidate: &Value) -> CandidateUpdate {
    let index = read_u32(candidate, "index");
    let mut update = CandidateUpdate {
        index,
        first: !state.choices.contains_key(&index),
        ..Default::default()
    };
    state.choice_mut(index).role = Some(Role::Assistant);

    let parts: Vec<SnapshotPart> = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(snapshot_part)
        .collect();

    let mut snapshot = state.snapshots.remove(&index).unwrap_or_default();
    let cumulative = continues(&snapshot, &parts);

    for (position, part) in parts.iter().enumerate() {
        let previous = snapshot.parts.get(position).filter(|_| cumulative);
        match part {
            SnapshotPart::Call { name, arguments } => {
                // Already folded at this part index
                if previous.is_some() {
                    continue;
                }
                let call_index = state.choice_mut(index).tool_calls.len() as u32;
                let id = format!("call_{}", uuid::Uuid::new_v4().simple());
                state.push_tool_call(index, call_index, Some(&id), Some(name.as_str()), arguments);
                update.tool_calls.push(ToolCallDelta {
                    index: call_index,
                    id: Some(id),
                    call_type: Some("function".to_string()),
                    function: Some(ToolCallFunctionDelta {
                        name: Some(name.clone()),
                        arguments: Some(arguments.clone()),
                    }),
                });
            }
            SnapshotPart::Text { thought, text } => {
                let added = match previous {
                    Some(SnapshotPart::Text { text: old, .. }) => snapshot_suffix(old, text),
                    _ => text.as_str(),
                };
                let choice = state.choice_mut(index);
                let (buffer, out) = if *thought {
                    (&mut choice.reasoning, &mut update.reasoning)
                } else {
                    (&mut choice.content, &mut update.content)
                };
                buffer.push_str(added);
                out.push_str(added);
            }
        }
    }

    snapshot.parts = parts;
    snapshot.cumulative = cumulative;
    state.snapshots.insert(index, snapshot);

    if !update.content.is_empty() {
        state.count_delta_frame();
    }

    if let Some(reason) = candidate.get("finishReason").and_then(Value::as_str) {
        let choice = state.choice_mut(index);
        let reason = match finish_reason(reason) {
            "stop" if !choice.tool_calls.is_empty() => "tool_calls",
            other => other,
        };
        state.set_finish_reason(index, reason);
        update.finish_reason = Some(reason.to_string());
    }

    update
}

fn apply(state: &mut AccumulatorState, frame: &str) -> Result<Vec<CandidateUpdate>, StreamError> {
    let sse = parse_sse_frame(frame);
    if sse.is_done() || sse.data.is_empty() {
        return Ok(Vec::new());
    }
    let payload = parse_json(&sse.data)?;
    if let Some(err) = provider_error(&payload) {
        return Err(err);
    }

    state.observe(
        payload.get("responseId").and_then(Value::as_str),
        payload.get("modelVersion").and_then(Value::as_str),
        None,
    );

    if let Some(usage) = payload.get("usageMetadata").filter(|u| u.is_object()) {
        state.record_usage(Usage::new(
            read_u32(usage, "promptTokenCount"),
            read_u32(usage, "candidatesTokenCount") + read_u32(usage, "thoughtsTokenCount"),
        ));
    }

    Ok(payload
        .get("candidates")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(|candidate| fold_candidate(state, candidate))
        .collect())
}

impl ProviderStreamAdapter for GoogleSnapshots {
    fn provider(&self) -> &str {
        INFO.id
    }

    fn delimiter(&self) -> &'static str {
        "\r\n\r\n"
    }

    fn pacing(&self) -> Pacing {
        Pacing::default().with_inter_chunk_delay(Duration::from_millis(1))
    }

    fn frame_to_chunk(
        &self,
        frame: &str,
        state: &mut AccumulatorState,
    ) -> Result<Option<String>, StreamError> {
        let updates = apply(state, frame)?;
        let metadata = state.metadata();

        let mut out = String::new();
        for update in updates {
            let delta = Delta {
                role: update.first.then_some(Role::Assistant),
                content: (!update.content.is_empty()).then_some(update.content),
                reasoning_content: (!update.reasoning.is_empty()).then_some(update.reasoning),
                tool_calls: (!update.tool_calls.is_empty()).then_some(update.tool_calls),
            };
            let is_empty = delta.role.is_none()
                && delta.content.is_none()
                && delta.reasoning_content.is_none()
                && delta.tool_calls.is_none();
            if is_empty && update.finish_reason.is_none() {
                continue;
            }
            let usage = update.finish_reason.as_ref().map(|_| state.final_usage());
            let chunk = create_chunk_with_metadata(
                &metadata,
                update.index,
                delta,
                update.finish_reason,
                usage,
            );
            out.push_str(&format_sse_chunk(&chunk));
        }

        Ok((!out.is_empty()).then_some(out))
    }

    fn fold_frame(&self, state: &mut AccumulatorState, frame: &str) -> Result<(), StreamError> {
        apply(state, frame).map(|_| ())
    }

    fn appends_done(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulate::{Aggregate, Aggregator};
    use pretty_assertions::assert_eq;

    fn build(operation: Operation, value: Value) -> Map<String, Value> {
        Google::new()
            .schema(operation)
            .unwrap()
            .build(&CanonicalRequest::from_value(value).unwrap())
            .unwrap()
    }

    fn fold(frames: &[&str]) -> crate::native::response::ChatCompletionResponse {
        let mut aggregator = Aggregator::new(Arc::new(GoogleSnapshots));
        for frame in frames {
            aggregator.push(frame).unwrap();
        }
        match aggregator.finish() {
            Aggregate::Chat(chat) => chat,
            other => panic!("unexpected {:?}", other),
        }
    }

    fn text_frame(text: &str) -> String {
        format!(
            "data: {}",
            json!({"candidates": [{"index": 0, "content": {"role": "model", "parts": [{"text": text}]}}]})
        )
    }

    #[test]
    fn test_generation_config_built_once() {
        let body = build(
            Operation::Chat,
            json!({
                "model": "gemini-2.0-flash",
                "messages": [{"role": "user", "content": "Hi"}],
                "temperature": 0.7,
                "max_tokens": 100,
                "stop": "END"
            }),
        );

        assert!(!body.contains_key("model"));
        assert_eq!(
            body["generationConfig"],
            json!({"temperature": 0.7, "maxOutputTokens": 100, "stopSequences": ["END"]})
        );
        assert_eq!(body["contents"], json!([{"role": "user", "parts": [{"text": "Hi"}]}]));
    }

    #[test]
    fn test_generation_config_clamps_temperature() {
        let body = build(
            Operation::Chat,
            json!({
                "model": "m",
                "messages": [{"role": "user", "content": "Hi"}],
                "temperature": 3.5,
                "top_p": 0.9
            }),
        );
        assert_eq!(body["generationConfig"], json!({"temperature": 2.0, "topP": 0.9}));
    }

    #[test]
    fn test_response_format_json_schema() {
        let body = build(
            Operation::Chat,
            json!({
                "model": "m",
                "messages": [{"role": "user", "content": "Hi"}],
                "response_format": {"type": "json_schema", "json_schema": {"name": "x", "schema": {"type": "object"}}}
            }),
        );
        assert_eq!(
            body["generationConfig"],
            json!({"responseMimeType": "application/json", "responseSchema": {"type": "object"}})
        );
    }

    #[test]
    fn test_contents_conversion() {
        let body = build(
            Operation::Chat,
            json!({
                "model": "m",
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": "Weather?"},
                    {"role": "assistant", "tool_calls": [{"id": "c1", "type": "function", "function": {"name": "weather", "arguments": "{\"city\":\"Oslo\"}"}}]},
                    {"role": "tool", "tool_call_id": "c1", "content": "5C"}
                ],
                "tools": [{"type": "function", "function": {"name": "weather", "parameters": {"type": "object"}}}],
                "tool_choice": "required"
            }),
        );

        assert_eq!(body["systemInstruction"], json!({"parts": [{"text": "Be brief."}]}));
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(
            contents[1]["parts"][0],
            json!({"functionCall": {"name": "weather", "args": {"city": "Oslo"}}})
        );
        assert_eq!(
            contents[2]["parts"][0],
            json!({"functionResponse": {"name": "weather", "response": {"content": "5C"}}})
        );
        assert_eq!(
            body["tools"],
            json!([{"functionDeclarations": [{"name": "weather", "parameters": {"type": "object"}}]}])
        );
        assert_eq!(body["toolConfig"], json!({"functionCallingConfig": {"mode": "ANY"}}));
    }

    #[test]
    fn test_embed_schema() {
        let body = build(
            Operation::Embed,
            json!({"model": "text-embedding-004", "input": "hello", "dimensions": 256}),
        );
        assert_eq!(body["model"], "models/text-embedding-004");
        assert_eq!(body["content"], json!({"parts": [{"text": "hello"}]}));
        assert_eq!(body["outputDimensionality"], 256);
    }

    #[test]
    fn test_endpoints() {
        let google = Google::new();
        assert_eq!(
            google.endpoint(Operation::Chat, "gemini-2.0-flash", true).as_deref(),
            Some("/models/gemini-2.0-flash:streamGenerateContent?alt=sse")
        );
        assert_eq!(
            google.endpoint(Operation::Chat, "gemini-2.0-flash", false).as_deref(),
            Some("/models/gemini-2.0-flash:generateContent")
        );
        assert_eq!(google.endpoint(Operation::Image, "m", false), None);
    }

    #[test]
    fn test_snapshot_suffix() {
        assert_eq!(snapshot_suffix("", "Hello"), "Hello");
        assert_eq!(snapshot_suffix("Hello", "Hello world"), " world");
        assert_eq!(snapshot_suffix("Hello", "!"), "!");
    }

    #[test]
    fn test_cumulative_snapshots_fold_to_final_text() {
        let frames = [text_frame("Hel"), text_frame("Hello"), text_frame("Hello, world")];
        let frames: Vec<&str> = frames.iter().map(String::as_str).collect();
        let chat = fold(&frames);
        assert_eq!(chat.choices[0].message.content.as_deref(), Some("Hello, world"));
    }

    #[test]
    fn test_incremental_snapshots_concatenate() {
        let frames = [text_frame("Hello"), text_frame(", "), text_frame("world")];
        let frames: Vec<&str> = frames.iter().map(String::as_str).collect();
        let chat = fold(&frames);
        assert_eq!(chat.choices[0].message.content.as_deref(), Some("Hello, world"));
    }

    #[test]
    fn test_thoughts_function_calls_and_usage() {
        let chat = fold(&[
            r#"data: {"responseId":"r1","modelVersion":"gemini-2.5-pro","candidates":[{"index":0,"content":{"parts":[{"text":"planning","thought":true}]}}]}"#,
            r#"data: {"candidates":[{"index":0,"content":{"parts":[{"functionCall":{"name":"weather","args":{"city":"Oslo"}}}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":7,"candidatesTokenCount":3,"thoughtsTokenCount":2}}"#,
        ]);

        assert_eq!(chat.id, "r1");
        assert_eq!(chat.model, "gemini-2.5-pro");
        let message = &chat.choices[0].message;
        assert_eq!(message.reasoning_content.as_deref(), Some("planning"));
        let calls = message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "weather");
        assert_eq!(
            serde_json::from_str::<Value>(&calls[0].function.arguments).unwrap(),
            json!({"city": "Oslo"})
        );
        assert_eq!(chat.choices[0].finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(chat.usage, Usage::new(7, 5));
    }

    #[test]
    fn test_error_payload_is_terminal() {
        let mut aggregator = Aggregator::new(Arc::new(GoogleSnapshots));
        let err = aggregator
            .push(r#"data: {"error":{"code":429,"message":"Resource exhausted","status":"RESOURCE_EXHAUSTED"}}"#)
            .unwrap_err();
        assert_eq!(
            err,
            StreamError::ProviderError {
                message: "Resource exhausted".to_string(),
                code: Some("429".to_string()),
            }
        );
    }

    #[test]
    fn test_forward_emits_only_new_text() {
        let adapter = GoogleSnapshots;
        let mut state = AccumulatorState::new();

        let parse = |chunk: String| -> Value {
            serde_json::from_str(chunk.trim_start_matches("data: ").trim_end()).unwrap()
        };

        let first = parse(adapter.frame_to_chunk(&text_frame("Hel"), &mut state).unwrap().unwrap());
        assert_eq!(first["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(first["choices"][0]["delta"]["content"], "Hel");

        let second = parse(adapter.frame_to_chunk(&text_frame("Hello"), &mut state).unwrap().unwrap());
        assert_eq!(second["choices"][0]["delta"]["content"], "lo");
        assert!(second["choices"][0]["delta"].get("role").is_none());

        // A repeated snapshot adds nothing
        let repeated = adapter.frame_to_chunk(&text_frame("Hello"), &mut state).unwrap();
        assert_eq!(repeated, None);
    }

    fn parts_frame(candidates: &[(u32, Value)]) -> String {
        let candidates: Vec<Value> = candidates
            .iter()
            .map(|(index, parts)| json!({"index": index, "content": {"role": "model", "parts": parts}}))
            .collect();
        format!("data: {}", json!({ "candidates": candidates }))
    }

    fn forward_events(
        adapter: &GoogleSnapshots,
        state: &mut AccumulatorState,
        frame: &str,
    ) -> Vec<Value> {
        adapter
            .frame_to_chunk(frame, state)
            .unwrap()
            .unwrap_or_default()
            .split("\n\n")
            .filter(|event| !event.trim().is_empty())
            .map(|event| serde_json::from_str(event.trim_start_matches("data: ")).unwrap())
            .collect()
    }

    fn weather_call() -> Value {
        json!({"functionCall": {"name": "weather", "args": {"city": "Oslo"}}})
    }

    #[test]
    fn test_multi_part_snapshots_fold_once() {
        let frames = [
            parts_frame(&[(0, json!([{"text": "Hello"}]))]),
            parts_frame(&[(0, json!([{"text": "Hello"}, {"text": " world"}]))]),
            parts_frame(&[(0, json!([{"text": "Hello"}, {"text": " world"}]))]),
        ];
        let frames: Vec<&str> = frames.iter().map(String::as_str).collect();
        let chat = fold(&frames);
        assert_eq!(chat.choices[0].message.content.as_deref(), Some("Hello world"));
    }

    #[test]
    fn test_equal_incremental_text_is_kept() {
        let frames = [text_frame("ha"), text_frame("ha")];
        let frames: Vec<&str> = frames.iter().map(String::as_str).collect();
        let chat = fold(&frames);
        assert_eq!(chat.choices[0].message.content.as_deref(), Some("haha"));
    }

    #[test]
    fn test_repeated_function_call_folds_once() {
        let frames = [
            parts_frame(&[(0, json!([{"text": "Checking"}, weather_call()]))]),
            parts_frame(&[(0, json!([{"text": "Checking"}, weather_call()]))]),
        ];
        let frames: Vec<&str> = frames.iter().map(String::as_str).collect();
        let chat = fold(&frames);

        let message = &chat.choices[0].message;
        assert_eq!(message.content.as_deref(), Some("Checking"));
        let calls = message.tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.name, "weather");

        // A lone call repeated across snapshots is the same call
        let frames = [
            parts_frame(&[(0, json!([weather_call()]))]),
            parts_frame(&[(0, json!([weather_call()]))]),
        ];
        let frames: Vec<&str> = frames.iter().map(String::as_str).collect();
        let chat = fold(&frames);
        assert_eq!(chat.choices[0].message.tool_calls.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_candidates_fold_independently() {
        let frames = [
            parts_frame(&[(0, json!([{"text": "Sun"}])), (1, json!([{"text": "Rain"}]))]),
            parts_frame(&[(0, json!([{"text": "Sunny"}])), (1, json!([{"text": " and"}]))]),
            parts_frame(&[(0, json!([{"text": "Sunny"}])), (1, json!([{"text": " wind"}]))]),
        ];
        let frames: Vec<&str> = frames.iter().map(String::as_str).collect();
        let chat = fold(&frames);

        assert_eq!(chat.choices.len(), 2);
        assert_eq!(chat.choices[0].index, 0);
        assert_eq!(chat.choices[0].message.content.as_deref(), Some("Sunny"));
        assert_eq!(chat.choices[1].index, 1);
        assert_eq!(chat.choices[1].message.content.as_deref(), Some("Rain and wind"));
    }

    #[test]
    fn test_forward_multi_part_snapshots() {
        let adapter = GoogleSnapshots;
        let mut state = AccumulatorState::new();

        let first = forward_events(&adapter, &mut state, &parts_frame(&[(0, json!([{"text": "Hello"}]))]));
        assert_eq!(first[0]["choices"][0]["delta"]["content"], "Hello");

        let grown = parts_frame(&[(0, json!([{"text": "Hello"}, {"text": " world"}]))]);
        let second = forward_events(&adapter, &mut state, &grown);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0]["choices"][0]["delta"]["content"], " world");

        assert!(forward_events(&adapter, &mut state, &grown).is_empty());
    }

    #[test]
    fn test_forward_repeated_function_call_emits_once() {
        let adapter = GoogleSnapshots;
        let mut state = AccumulatorState::new();
        let frame = parts_frame(&[(0, json!([weather_call()]))]);

        let first = forward_events(&adapter, &mut state, &frame);
        let calls = first[0]["choices"][0]["delta"]["tool_calls"].as_array().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["index"], 0);
        assert_eq!(calls[0]["function"]["name"], "weather");

        assert!(forward_events(&adapter, &mut state, &frame).is_empty());
    }

    #[test]
    fn test_forward_second_candidate() {
        let adapter = GoogleSnapshots;
        let mut state = AccumulatorState::new();

        let both = parts_frame(&[(0, json!([{"text": "Sun"}])), (1, json!([{"text": "Rain"}]))]);
        let first = forward_events(&adapter, &mut state, &both);
        assert_eq!(first.len(), 2);
        assert_eq!(first[1]["choices"][0]["index"], 1);
        assert_eq!(first[1]["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(first[1]["choices"][0]["delta"]["content"], "Rain");

        let grown = parts_frame(&[(1, json!([{"text": "Rainy"}]))]);
        let second = forward_events(&adapter, &mut state, &grown);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0]["choices"][0]["index"], 1);
        assert_eq!(second[0]["choices"][0]["delta"]["content"], "y");
    }

    #[test]
    fn test_adapter_protocol_settings() {
        let adapter = GoogleSnapshots;
        assert_eq!(adapter.delimiter(), "\r\n\r\n");
        assert_eq!(adapter.pacing().inter_chunk_delay, Some(Duration::from_millis(1)));
        assert!(adapter.appends_done());
    }
}
