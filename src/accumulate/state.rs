//! Per-stream accumulator state

use std::collections::BTreeMap;

use serde_json::Value;

use crate::native::response::{
    ChatCompletionResponse, Choice, ChoiceMessage, ToolCall, ToolCallFunction, Usage,
};
use crate::native::streaming::StreamMetadata;
use crate::native::types::Role;

/// Tool call assembled from argument fragments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallState {
    pub id: Option<String>,
    pub name: String,
    pub arguments: String,
}

/// Accumulated content for one choice (or Google candidate)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChoiceState {
    pub role: Option<Role>,
    pub content: String,
    pub reasoning: String,
    pub tool_calls: BTreeMap<u32, ToolCallState>,
    pub finish_reason: Option<String>,
}

impl ChoiceState {
    fn into_choice(self, index: u32) -> Choice {
        let tool_calls: Vec<ToolCall> = self
            .tool_calls
            .into_values()
            .map(|call| ToolCall {
                id: call
                    .id
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
                call_type: "function".to_string(),
                function: ToolCallFunction {
                    name: call.name,
                    arguments: call.arguments,
                },
            })
            .collect();

        let content = if self.content.is_empty() && !tool_calls.is_empty() {
            None
        } else {
            Some(self.content)
        };

        Choice {
            index,
            message: ChoiceMessage {
                role: self.role.unwrap_or(Role::Assistant),
                content,
                reasoning_content: (!self.reasoning.is_empty()).then_some(self.reasoning),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            },
            finish_reason: self.finish_reason,
        }
    }
}

/// Kind of an Anthropic-style indexed content block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Text,
    Thinking,
    /// Tool use block, mapped to this tool-call index
    ToolUse(u32),
}

/// One part of a candidate snapshot, as last seen
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotPart {
    Text { thought: bool, text: String },
    Call { name: String, arguments: String },
}

/// Last snapshot frame seen for one candidate index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSnapshot {
    pub parts: Vec<SnapshotPart>,
    /// Set once frames are known to repeat earlier parts
    pub cumulative: bool,
}

/// Mutable state threaded through every fold step of one stream
///
/// Buffers only grow: text is appended, indices are backfilled, nothing that
/// was folded in is removed by a later frame.
#[derive(Debug, Clone)]
pub struct AccumulatorState {
    pub id: Option<String>,
    pub model: Option<String>,
    pub created: Option<u64>,
    fallback_id: String,
    fallback_created: u64,
    pub choices: BTreeMap<u32, ChoiceState>,
    /// Content blocks keyed by block index
    pub blocks: BTreeMap<u32, BlockKind>,
    /// Last usage the provider reported
    pub usage: Option<Usage>,
    /// Number of content delta frames seen
    pub delta_frames: u32,
    /// Terminal frame for last-wins folds
    pub terminal: Option<Value>,
    /// Raw frames kept for reverse-scanning folds
    pub frames: Vec<String>,
    /// Per-candidate snapshots for diffing folds, keyed by candidate index
    pub snapshots: BTreeMap<u32, CandidateSnapshot>,
}

impl Default for AccumulatorState {
    fn default() -> Self {
        Self::new()
    }
}

impl AccumulatorState {
    pub fn new() -> Self {
        Self {
            id: None,
            model: None,
            created: None,
            fallback_id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            fallback_created: chrono::Utc::now().timestamp().max(0) as u64,
            choices: BTreeMap::new(),
            blocks: BTreeMap::new(),
            usage: None,
            delta_frames: 0,
            terminal: None,
            frames: Vec::new(),
            snapshots: BTreeMap::new(),
        }
    }

    /// Id used when the provider never sent one
    pub fn fallback_id(&self) -> &str {
        &self.fallback_id
    }

    /// Id, model and created time shared by every emitted chunk
    pub fn metadata(&self) -> StreamMetadata {
        StreamMetadata {
            id: self.id.clone().unwrap_or_else(|| self.fallback_id.clone()),
            model: self.model.clone().unwrap_or_default(),
            created: self.created.unwrap_or(self.fallback_created),
        }
    }

    /// Record stream metadata; the first value seen wins
    pub fn observe(&mut self, id: Option<&str>, model: Option<&str>, created: Option<u64>) {
        if self.id.is_none() {
            self.id = id.filter(|s| !s.is_empty()).map(str::to_string);
        }
        if self.model.is_none() {
            self.model = model.filter(|s| !s.is_empty()).map(str::to_string);
        }
        if self.created.is_none() {
            self.created = created;
        }
    }

    pub fn choice_mut(&mut self, index: u32) -> &mut ChoiceState {
        self.choices.entry(index).or_default()
    }

    pub fn push_content(&mut self, index: u32, text: &str) {
        self.choice_mut(index).content.push_str(text);
    }

    pub fn push_reasoning(&mut self, index: u32, text: &str) {
        self.choice_mut(index).reasoning.push_str(text);
    }

    /// Fold a tool-call fragment: id and name fill in once, arguments append
    pub fn push_tool_call(
        &mut self,
        choice: u32,
        index: u32,
        id: Option<&str>,
        name: Option<&str>,
        arguments: &str,
    ) {
        let call = self.choice_mut(choice).tool_calls.entry(index).or_default();
        if call.id.is_none() {
            call.id = id.filter(|s| !s.is_empty()).map(str::to_string);
        }
        if call.name.is_empty() {
            if let Some(name) = name {
                call.name = name.to_string();
            }
        }
        call.arguments.push_str(arguments);
    }

    pub fn set_finish_reason(&mut self, index: u32, reason: &str) {
        self.choice_mut(index).finish_reason = Some(reason.to_string());
    }

    /// Replace usage with the latest provider report
    pub fn record_usage(&mut self, usage: Usage) {
        self.usage = Some(usage);
    }

    pub fn count_delta_frame(&mut self) {
        self.delta_frames += 1;
    }

    /// Whether nothing has been folded in
    pub fn is_empty(&self) -> bool {
        self.choices.is_empty() && self.terminal.is_none() && self.frames.is_empty()
    }

    /// Usage reported by the provider, else one completion token per delta frame
    pub fn final_usage(&self) -> Usage {
        self.usage
            .clone()
            .unwrap_or_else(|| Usage::new(0, self.delta_frames))
    }

    /// Convert into a final chat completion
    ///
    /// A stream that produced nothing yields an empty choice list.
    pub fn into_chat_completion(self) -> ChatCompletionResponse {
        let metadata = self.metadata();
        let usage = self.final_usage();

        ChatCompletionResponse {
            id: metadata.id,
            object: "chat.completion".to_string(),
            created: metadata.created,
            model: metadata.model,
            choices: self
                .choices
                .into_iter()
                .map(|(index, choice)| choice.into_choice(index))
                .collect(),
            usage,
        }
    }
}
