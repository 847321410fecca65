//! Mock upstream providers for testing
//!
//! Provides a wiremock server that answers provider endpoints with canned
//! SSE bodies, plus fixtures for each provider family's stream format.
//!
//! # Example
//!
//! ```rust,ignore
//! use crate::mocks::providers::{MockProvider, StreamFixtures};
//!
//! #[tokio::test]
//! async fn test_with_provider_mock() {
//!     let upstream = MockProvider::start().await;
//!     upstream.mock_stream("/v1/chat/completions", StreamFixtures::openai_text(&["Hi"])).await;
//!
//!     // Use upstream.uri() as the provider base URL
//! }
//! ```

use serde_json::{json, Value};
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

/// Mock provider server wrapper
pub struct MockProvider {
    server: MockServer,
}

impl MockProvider {
    /// Start a new mock provider server
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Get the mock server URI
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Reference to the underlying wiremock server
    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Answer POST `endpoint` with an SSE body
    pub async fn mock_stream(&self, endpoint: &str, body: String) {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/event-stream"),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer POST `endpoint` with an SSE body only when `name: value` is sent
    pub async fn mock_stream_with_header(&self, endpoint: &str, name: &str, value: &str, body: String) {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .and(header(name, value))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/event-stream"),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer POST `endpoint` with an error status and JSON body
    pub async fn mock_error(&self, endpoint: &str, status: u16, body: Value) {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// JSON bodies of every request the server received
    pub async fn received_bodies(&self) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|request| request.body_json::<Value>().unwrap_or(Value::Null))
            .collect()
    }
}

/// Canned upstream stream bodies
pub struct StreamFixtures;

impl StreamFixtures {
    fn data(payload: Value) -> String {
        format!("data: {}\n\n", payload)
    }

    fn event(name: &str, payload: Value) -> String {
        format!("event: {}\ndata: {}\n\n", name, payload)
    }

    /// OpenAI-style deltas, one per piece, with a final usage chunk
    pub fn openai_text(pieces: &[&str]) -> String {
        let mut body = String::new();
        for (i, piece) in pieces.iter().enumerate() {
            let mut delta = json!({"content": piece});
            if i == 0 {
                delta["role"] = json!("assistant");
            }
            body.push_str(&Self::data(json!({
                "id": "chatcmpl-mock",
                "object": "chat.completion.chunk",
                "created": 1700000000,
                "model": "gpt-4o-mini",
                "choices": [{"index": 0, "delta": delta, "finish_reason": null}]
            })));
        }
        body.push_str(&Self::data(json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion.chunk",
            "created": 1700000000,
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
        })));
        body.push_str(&Self::data(json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion.chunk",
            "model": "gpt-4o-mini",
            "choices": [],
            "usage": {"prompt_tokens": 9, "completion_tokens": 12, "total_tokens": 21}
        })));
        body.push_str("data: [DONE]\n\n");
        body
    }

    /// OpenAI-style stream whose length finish reason marks it truncated
    pub fn openai_truncated(text: &str) -> String {
        let mut body = Self::data(json!({
            "id": "chatcmpl-cut",
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "delta": {"role": "assistant", "content": text}}]
        }));
        body.push_str(&Self::data(json!({
            "id": "chatcmpl-cut",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "length"}]
        })));
        body.push_str("data: [DONE]\n\n");
        body
    }

    /// OpenAI-style stream that fails midway with an error payload
    pub fn openai_error_midway() -> String {
        let mut body = Self::data(json!({
            "id": "chatcmpl-err",
            "choices": [{"index": 0, "delta": {"content": "partial"}}]
        }));
        body.push_str(&Self::data(json!({
            "error": {"message": "model overloaded", "type": "server_error"}
        })));
        body
    }

    /// Anthropic messages event stream
    pub fn anthropic_text(pieces: &[&str]) -> String {
        let mut body = Self::event(
            "message_start",
            json!({
                "type": "message_start",
                "message": {
                    "id": "msg_mock",
                    "model": "claude-sonnet-4",
                    "role": "assistant",
                    "usage": {"input_tokens": 14, "output_tokens": 1}
                }
            }),
        );
        body.push_str(&Self::event(
            "content_block_start",
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        ));
        body.push_str(": ping\n\n");
        for piece in pieces {
            body.push_str(&Self::event(
                "content_block_delta",
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": piece}}),
            ));
        }
        body.push_str(&Self::event(
            "content_block_stop",
            json!({"type": "content_block_stop", "index": 0}),
        ));
        body.push_str(&Self::event(
            "message_delta",
            json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 6}}),
        ));
        body.push_str(&Self::event("message_stop", json!({"type": "message_stop"})));
        body
    }

    /// Google snapshot stream where each frame repeats the text so far
    pub fn google_snapshots(snapshots: &[&str]) -> String {
        let mut body = String::new();
        for (i, text) in snapshots.iter().enumerate() {
            let mut candidate = json!({"content": {"role": "model", "parts": [{"text": text}]}, "index": 0});
            let mut frame = json!({"responseId": "resp-mock", "modelVersion": "gemini-2.0-flash"});
            if i + 1 == snapshots.len() {
                candidate["finishReason"] = json!("STOP");
                frame["usageMetadata"] =
                    json!({"promptTokenCount": 5, "candidatesTokenCount": 7, "totalTokenCount": 12});
            }
            frame["candidates"] = json!([candidate]);
            body.push_str(&format!("data: {}\r\n\r\n", frame));
        }
        body
    }

    /// Cohere newline-delimited event stream
    pub fn cohere_text(pieces: &[&str]) -> String {
        let mut lines = vec![json!({"event_type": "stream-start", "generation_id": "gen-mock", "is_finished": false})];
        for piece in pieces {
            lines.push(json!({"event_type": "text-generation", "text": piece, "is_finished": false}));
        }
        lines.push(json!({
            "event_type": "stream-end",
            "is_finished": true,
            "finish_reason": "COMPLETE",
            "response": {
                "generation_id": "gen-mock",
                "text": pieces.concat(),
                "meta": {"billed_units": {"input_tokens": 4, "output_tokens": 3}}
            }
        }));
        lines.iter().map(|line| format!("{}\n", line)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_fixture_ends_with_done() {
        let body = StreamFixtures::openai_text(&["a", "b"]);
        assert!(body.ends_with("data: [DONE]\n\n"));
        assert_eq!(body.matches("\n\n").count(), 5);
    }

    #[test]
    fn test_cohere_fixture_is_ndjson() {
        let body = StreamFixtures::cohere_text(&["x"]);
        for line in body.lines() {
            assert!(serde_json::from_str::<Value>(line).is_ok());
        }
    }
}
