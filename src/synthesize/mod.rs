//! Lifecycle event synthesis
//!
//! Replays one fully-buffered [`ResponseObject`] as the ordered Responses
//! API event stream a live upstream would have produced. Every id in the
//! replay is freshly generated, so two replays of the same response are
//! distinguishable from each other and from the source.
//!
//! Event order for a successful response:
//!
//! ```text
//! response.created
//! response.in_progress
//!   response.output_item.added          (per item, in order)
//!     ...item-specific events...
//!   response.output_item.done
//! response.completed
//! ```
//!
//! An `error`, a `failed` status or an `incomplete` status short-circuits to
//! a single terminal event.

use serde_json::{json, Value};
use tracing::debug;

use crate::accumulate::SseStream;
use crate::native::responses::{
    ContentPart, OutputItem, ResponseObject, ResponseStatus,
};
use crate::native::streaming::format_sse_event;

/// Characters per synthesized text delta
pub const TEXT_CHUNK_CHARS: usize = 500;

fn fresh_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}

/// Split `text` into pieces of at most `size` characters
///
/// Splits on character boundaries, never inside a multi-byte character.
pub fn chunk_text(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (offset, _) in text.char_indices() {
        if count == size {
            chunks.push(&text[start..offset]);
            start = offset;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

/// Copy of `item` with fresh ids
fn refresh_ids(item: &OutputItem) -> OutputItem {
    let mut item = item.clone();
    match &mut item {
        OutputItem::Message(message) => message.id = fresh_id("msg"),
        OutputItem::FunctionCall(call) => {
            call.id = fresh_id("fc");
            call.call_id = fresh_id("call");
        }
        OutputItem::WebSearchCall(search) => search.id = fresh_id("ws"),
        OutputItem::FileSearchCall(search) => search.id = fresh_id("fs"),
        OutputItem::ComputerCall(call) => {
            call.id = fresh_id("cu");
            call.call_id = fresh_id("call");
        }
        OutputItem::Reasoning(reasoning) => reasoning.id = fresh_id("rs"),
    }
    item
}

fn item_id(item: &OutputItem) -> &str {
    match item {
        OutputItem::Message(m) => &m.id,
        OutputItem::FunctionCall(c) => &c.id,
        OutputItem::WebSearchCall(s) => &s.id,
        OutputItem::FileSearchCall(s) => &s.id,
        OutputItem::ComputerCall(c) => &c.id,
        OutputItem::Reasoning(r) => &r.id,
    }
}

/// The item as announced by `output_item.added`: in progress, nothing produced
fn pending_item(item: &OutputItem) -> OutputItem {
    let mut item = item.clone();
    match &mut item {
        OutputItem::Message(message) => {
            message.status = "in_progress".to_string();
            message.content.clear();
        }
        OutputItem::FunctionCall(call) => {
            call.status = "in_progress".to_string();
            call.arguments.clear();
        }
        OutputItem::WebSearchCall(search) => search.status = "in_progress".to_string(),
        OutputItem::FileSearchCall(search) => {
            search.status = "in_progress".to_string();
            search.results = None;
        }
        OutputItem::ComputerCall(call) => call.status = "in_progress".to_string(),
        OutputItem::Reasoning(reasoning) => reasoning.summary.clear(),
    }
    item
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_default()
}

/// Accumulates framed events, numbering them in emission order
struct EventWriter {
    events: Vec<String>,
    sequence: u64,
}

impl EventWriter {
    fn new() -> Self {
        Self {
            events: Vec::new(),
            sequence: 0,
        }
    }

    fn emit(&mut self, event_type: &str, mut payload: Value) {
        payload["type"] = json!(event_type);
        payload["sequence_number"] = json!(self.sequence);
        self.sequence += 1;
        self.events.push(format_sse_event(event_type, &payload));
    }

    fn content_part(&mut self, item_id: &str, output_index: usize, content_index: usize, part: &ContentPart) {
        let at = json!({
            "item_id": item_id,
            "output_index": output_index,
            "content_index": content_index,
        });
        let with = |extra: Value| {
            let mut payload = at.clone();
            if let (Some(payload), Value::Object(extra)) = (payload.as_object_mut(), extra) {
                payload.extend(extra);
            }
            payload
        };

        let (empty, text, delta_event, done_event, field) = match part {
            ContentPart::OutputText { text, .. } => (
                json!({"type": "output_text", "text": "", "annotations": []}),
                text.as_str(),
                "response.output_text.delta",
                "response.output_text.done",
                "text",
            ),
            ContentPart::Refusal { refusal } => (
                json!({"type": "refusal", "refusal": ""}),
                refusal.as_str(),
                "response.refusal.delta",
                "response.refusal.done",
                "refusal",
            ),
        };

        self.emit("response.content_part.added", with(json!({"part": empty})));
        for chunk in chunk_text(text, TEXT_CHUNK_CHARS) {
            self.emit(delta_event, with(json!({"delta": chunk})));
        }
        let mut done = json!({});
        done[field] = json!(text);
        self.emit(done_event, with(done));
        self.emit("response.content_part.done", with(json!({"part": to_value(part)})));
    }

    fn item(&mut self, output_index: usize, item: &OutputItem) {
        let id = item_id(item).to_string();
        self.emit(
            "response.output_item.added",
            json!({"output_index": output_index, "item": to_value(&pending_item(item))}),
        );

        match item {
            OutputItem::Message(message) => {
                for (content_index, part) in message.content.iter().enumerate() {
                    self.content_part(&id, output_index, content_index, part);
                }
            }
            OutputItem::FunctionCall(call) => {
                self.emit(
                    "response.function_call_arguments.delta",
                    json!({"item_id": id, "output_index": output_index, "delta": call.arguments}),
                );
                self.emit(
                    "response.function_call_arguments.done",
                    json!({"item_id": id, "output_index": output_index, "arguments": call.arguments}),
                );
            }
            OutputItem::WebSearchCall(_) => self.search_phases("web_search_call", &id, output_index),
            OutputItem::FileSearchCall(_) => self.search_phases("file_search_call", &id, output_index),
            OutputItem::ComputerCall(_) | OutputItem::Reasoning(_) => {}
        }

        self.emit(
            "response.output_item.done",
            json!({"output_index": output_index, "item": to_value(item)}),
        );
    }

    fn search_phases(&mut self, kind: &str, item_id: &str, output_index: usize) {
        for phase in ["in_progress", "searching", "completed"] {
            self.emit(
                &format!("response.{}.{}", kind, phase),
                json!({"item_id": item_id, "output_index": output_index}),
            );
        }
    }
}

/// Replay `response` as framed lifecycle SSE events
pub fn synthesize_events(response: &ResponseObject) -> Vec<String> {
    let mut writer = EventWriter::new();

    if let Some(error) = &response.error {
        writer.emit(
            "error",
            json!({"code": error.code, "message": error.message, "param": null}),
        );
        return writer.events;
    }

    let mut replay = response.clone();
    replay.id = fresh_id("resp");
    replay.created_at = chrono::Utc::now().timestamp();
    replay.output = response.output.iter().map(refresh_ids).collect();

    match response.status {
        ResponseStatus::Failed => {
            writer.emit("response.failed", json!({"response": to_value(&replay)}));
            return writer.events;
        }
        ResponseStatus::Incomplete => {
            writer.emit("response.incomplete", json!({"response": to_value(&replay)}));
            return writer.events;
        }
        _ => {}
    }

    let mut started = replay.clone();
    started.status = ResponseStatus::InProgress;
    started.output.clear();
    started.usage = None;
    let started = to_value(&started);
    writer.emit("response.created", json!({"response": started}));
    writer.emit("response.in_progress", json!({"response": started}));

    for (output_index, item) in replay.output.iter().enumerate() {
        writer.item(output_index, item);
    }

    replay.status = ResponseStatus::Completed;
    writer.emit("response.completed", json!({"response": to_value(&replay)}));

    debug!(
        response_id = %replay.id,
        items = replay.output.len(),
        events = writer.events.len(),
        "Synthesized response events"
    );
    writer.events
}

/// Lifecycle events as a stream of SSE strings
pub fn event_stream(response: &ResponseObject) -> SseStream {
    Box::pin(futures::stream::iter(synthesize_events(response)))
}
