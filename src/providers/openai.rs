//! OpenAI-compatible family
//!
//! OpenAI and every provider speaking its wire format (Groq, Together,
//! Mistral, DeepSeek). Requests are mostly pass-through; streams are delta
//! chunks folded per choice and tool-call index.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use super::transcription::TranscriptionAdapter;
use super::{read_u32, AuthStyle, Provider, ProviderFamily, ProviderInfo};
use crate::accumulate::{parse_json, provider_error, AccumulatorState, ProviderStreamAdapter};
use crate::mapping::{Operation, ParameterConfig, ProviderSchema};
use crate::native::request::CanonicalRequest;
use crate::native::response::Usage;
use crate::native::streaming::{format_sse_data, format_sse_done, StreamError};
use crate::native::types::Role;
use crate::streaming::parse_sse_frame;

const CHAT_PASSTHROUGH: &[&str] = &[
    "frequency_penalty",
    "logit_bias",
    "logprobs",
    "top_logprobs",
    "max_tokens",
    "max_completion_tokens",
    "n",
    "presence_penalty",
    "response_format",
    "stop",
    "stream",
    "top_p",
    "tools",
    "parallel_tool_calls",
    "user",
    "reasoning_effort",
    "modalities",
    "metadata",
];

/// Dialect differences inside the family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    OpenAi,
    Mistral,
    Plain,
}

/// Provider speaking the OpenAI wire format
pub struct OpenAiCompatible {
    info: ProviderInfo,
    schemas: HashMap<Operation, ProviderSchema>,
}

impl OpenAiCompatible {
    fn new(info: ProviderInfo, dialect: Dialect, operations: &[Operation]) -> Self {
        let schemas = operations
            .iter()
            .map(|&op| {
                let schema = match op {
                    Operation::Chat => chat_schema(dialect),
                    Operation::Complete => complete_schema(),
                    Operation::Embed => embed_schema(),
                    Operation::Image => image_schema(),
                    Operation::Speech => speech_schema(),
                    Operation::Transcription => transcription_schema(),
                };
                (op, schema)
            })
            .collect();
        Self { info, schemas }
    }

    pub fn openai() -> Self {
        Self::new(
            info("openai", "OpenAI", "https://api.openai.com/v1"),
            Dialect::OpenAi,
            &[
                Operation::Chat,
                Operation::Complete,
                Operation::Embed,
                Operation::Image,
                Operation::Speech,
                Operation::Transcription,
            ],
        )
    }

    pub fn groq() -> Self {
        Self::new(
            info("groq", "Groq", "https://api.groq.com/openai/v1"),
            Dialect::Plain,
            &[Operation::Chat, Operation::Transcription],
        )
    }

    pub fn together() -> Self {
        Self::new(
            info("together-ai", "Together AI", "https://api.together.xyz/v1"),
            Dialect::Plain,
            &[Operation::Chat, Operation::Complete, Operation::Embed, Operation::Image],
        )
    }

    pub fn mistral() -> Self {
        Self::new(
            info("mistral-ai", "Mistral AI", "https://api.mistral.ai/v1"),
            Dialect::Mistral,
            &[Operation::Chat, Operation::Embed],
        )
    }

    pub fn deepseek() -> Self {
        Self::new(
            info("deepseek", "DeepSeek", "https://api.deepseek.com"),
            Dialect::Plain,
            &[Operation::Chat, Operation::Complete],
        )
    }
}

fn info(id: &'static str, display_name: &'static str, base_url: &'static str) -> ProviderInfo {
    ProviderInfo {
        id,
        display_name,
        family: ProviderFamily::OpenAi,
        base_url,
        auth: AuthStyle::Bearer,
        extra_headers: &[],
    }
}

/// Every built-in OpenAI-compatible provider
pub fn compatible_providers() -> Vec<Arc<dyn Provider>> {
    vec![
        Arc::new(OpenAiCompatible::openai()),
        Arc::new(OpenAiCompatible::groq()),
        Arc::new(OpenAiCompatible::together()),
        Arc::new(OpenAiCompatible::mistral()),
        Arc::new(OpenAiCompatible::deepseek()),
    ]
}

impl Provider for OpenAiCompatible {
    fn info(&self) -> &ProviderInfo {
        &self.info
    }

    fn schema(&self, operation: Operation) -> Option<&ProviderSchema> {
        self.schemas.get(&operation)
    }

    fn endpoint(&self, operation: Operation, _model: &str, _stream: bool) -> Option<String> {
        if !self.supports(operation) {
            return None;
        }
        let path = match operation {
            Operation::Chat => "/chat/completions",
            Operation::Complete => "/completions",
            Operation::Embed => "/embeddings",
            Operation::Image => "/images/generations",
            Operation::Speech => "/audio/speech",
            Operation::Transcription => "/audio/transcriptions",
        };
        Some(path.to_string())
    }

    fn stream_adapter(&self, operation: Operation) -> Option<Arc<dyn ProviderStreamAdapter>> {
        if !self.supports(operation) {
            return None;
        }
        match operation {
            Operation::Chat | Operation::Complete => Some(Arc::new(OpenAiDelta::new(self.info.id))),
            Operation::Transcription => Some(Arc::new(TranscriptionAdapter::new(self.info.id))),
            _ => None,
        }
    }
}

// ============================================================================
// Request schemas
// ============================================================================

/// Ask for usage on the final chunk whenever the call streams
fn include_usage(request: &CanonicalRequest) -> Option<Value> {
    request.is_stream().then(|| json!({"include_usage": true}))
}

fn chat_schema(dialect: Dialect) -> ProviderSchema {
    let schema = ProviderSchema::new()
        .passthrough(CHAT_PASSTHROUGH)
        .param("model", ParameterConfig::new("model").required())
        .param("messages", ParameterConfig::new("messages").required())
        .param("temperature", ParameterConfig::new("temperature").range(0.0, 2.0));

    match dialect {
        Dialect::OpenAi => schema
            .param("seed", ParameterConfig::new("seed"))
            .param("tool_choice", ParameterConfig::new("tool_choice"))
            .param(
                "stream_options",
                ParameterConfig::new("stream_options").default_with(include_usage),
            ),
        Dialect::Mistral => schema
            .param("seed", ParameterConfig::new("random_seed"))
            .param(
                "tool_choice",
                ParameterConfig::new("tool_choice").transform(|req: &CanonicalRequest| {
                    match req.get("tool_choice")? {
                        Value::String(choice) if choice == "required" => Some(json!("any")),
                        other => Some(other.clone()),
                    }
                }),
            ),
        Dialect::Plain => schema
            .param("seed", ParameterConfig::new("seed"))
            .param("tool_choice", ParameterConfig::new("tool_choice"))
            .param("stream_options", ParameterConfig::new("stream_options")),
    }
}

fn complete_schema() -> ProviderSchema {
    ProviderSchema::new()
        .passthrough(&[
            "max_tokens",
            "top_p",
            "n",
            "stream",
            "logprobs",
            "echo",
            "stop",
            "presence_penalty",
            "frequency_penalty",
            "best_of",
            "logit_bias",
            "user",
            "suffix",
            "seed",
        ])
        .param("model", ParameterConfig::new("model").required())
        .param("prompt", ParameterConfig::new("prompt").required())
        .param("temperature", ParameterConfig::new("temperature").range(0.0, 2.0))
}

fn embed_schema() -> ProviderSchema {
    ProviderSchema::new()
        .passthrough(&["encoding_format", "dimensions", "user"])
        .param("model", ParameterConfig::new("model").required())
        .param("input", ParameterConfig::new("input").required())
}

fn image_schema() -> ProviderSchema {
    ProviderSchema::new()
        .passthrough(&["model", "quality", "response_format", "size", "style", "user"])
        .param("prompt", ParameterConfig::new("prompt").required())
        .param("n", ParameterConfig::new("n").range(1.0, 10.0))
}

fn speech_schema() -> ProviderSchema {
    ProviderSchema::new()
        .passthrough(&["response_format", "instructions"])
        .param("model", ParameterConfig::new("model").required())
        .param("input", ParameterConfig::new("input").required())
        .param("voice", ParameterConfig::new("voice").default_value(json!("alloy")))
        .param("speed", ParameterConfig::new("speed").range(0.25, 4.0))
}

fn transcription_schema() -> ProviderSchema {
    ProviderSchema::new()
        .passthrough(&[
            "language",
            "prompt",
            "response_format",
            "stream",
            "timestamp_granularities",
        ])
        .param("model", ParameterConfig::new("model").required())
        .param("file", ParameterConfig::new("file").required())
        .param("temperature", ParameterConfig::new("temperature").range(0.0, 1.0))
}

// ============================================================================
// Stream protocol
// ============================================================================

/// Delta-chunk stream adapter
#[derive(Debug, Clone)]
pub struct OpenAiDelta {
    provider: &'static str,
}

impl OpenAiDelta {
    pub fn new(provider: &'static str) -> Self {
        Self { provider }
    }
}

fn read_usage(usage: &Value) -> Usage {
    let prompt = read_u32(usage, "prompt_tokens");
    let completion = read_u32(usage, "completion_tokens");
    match read_u32(usage, "total_tokens") {
        0 => Usage::new(prompt, completion),
        total => Usage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: total,
        },
    }
}

/// Fold one delta payload into the state
fn fold_delta(state: &mut AccumulatorState, payload: &Value) {
    state.observe(
        payload.get("id").and_then(Value::as_str),
        payload.get("model").and_then(Value::as_str),
        payload.get("created").and_then(Value::as_u64),
    );

    if let Some(usage) = payload.get("usage").filter(|u| u.is_object()) {
        state.record_usage(read_usage(usage));
    }

    let Some(choices) = payload.get("choices").and_then(Value::as_array) else {
        return;
    };

    let mut saw_content = false;
    for (position, choice) in choices.iter().enumerate() {
        let index = choice
            .get("index")
            .and_then(Value::as_u64)
            .unwrap_or(position as u64) as u32;
        // Legacy completions carry `text` on the choice itself
        let delta = choice.get("delta").unwrap_or(choice);

        let entry = state.choice_mut(index);
        if delta.get("role").is_some() && entry.role.is_none() {
            entry.role = Some(Role::of(delta));
        }

        let text = delta
            .get("content")
            .and_then(Value::as_str)
            .or_else(|| choice.get("text").and_then(Value::as_str));
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            state.push_content(index, text);
            saw_content = true;
        }

        let reasoning = delta
            .get("reasoning_content")
            .or_else(|| delta.get("reasoning"))
            .and_then(Value::as_str);
        if let Some(reasoning) = reasoning.filter(|r| !r.is_empty()) {
            state.push_reasoning(index, reasoning);
        }

        if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for (call_position, call) in calls.iter().enumerate() {
                let call_index = call
                    .get("index")
                    .and_then(Value::as_u64)
                    .unwrap_or(call_position as u64) as u32;
                let function = call.get("function");
                state.push_tool_call(
                    index,
                    call_index,
                    call.get("id").and_then(Value::as_str),
                    function.and_then(|f| f.get("name")).and_then(Value::as_str),
                    function
                        .and_then(|f| f.get("arguments"))
                        .and_then(Value::as_str)
                        .unwrap_or_default(),
                );
            }
        }

        if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
            state.set_finish_reason(index, reason);
        }
    }

    if saw_content {
        state.count_delta_frame();
    }
}

impl ProviderStreamAdapter for OpenAiDelta {
    fn provider(&self) -> &str {
        self.provider
    }

    fn frame_to_chunk(
        &self,
        frame: &str,
        state: &mut AccumulatorState,
    ) -> Result<Option<String>, StreamError> {
        let sse = parse_sse_frame(frame);
        if sse.is_done() {
            return Ok(Some(format_sse_done()));
        }
        if sse.data.is_empty() {
            return Ok(None);
        }

        let mut payload = parse_json(&sse.data)?;
        if let Some(err) = provider_error(&payload) {
            return Err(err);
        }
        fold_delta(state, &payload);

        if let Value::Object(map) = &mut payload {
            let has_id = map.get("id").and_then(Value::as_str).is_some_and(|id| !id.is_empty());
            if !has_id {
                map.insert("id".to_string(), Value::String(state.metadata().id));
            }
        }
        Ok(Some(format_sse_data(&payload)))
    }

    fn fold_frame(&self, state: &mut AccumulatorState, frame: &str) -> Result<(), StreamError> {
        let sse = parse_sse_frame(frame);
        if sse.is_done() || sse.data.is_empty() {
            return Ok(());
        }

        let payload = parse_json(&sse.data)?;
        if let Some(err) = provider_error(&payload) {
            return Err(err);
        }
        fold_delta(state, &payload);
        Ok(())
    }
}
