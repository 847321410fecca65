//! Responses endpoint integration tests
//!
//! Tests for POST /v1/responses:
//! - JSON conversion of an aggregated chat completion
//! - Lifecycle event replay for `stream: true`
//! - Long text split into 500-character deltas
//! - Incomplete and failed short-circuits

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::{provider_header, sse_data, sse_events, test_config, test_server};
use crate::mocks::{MockProvider, StreamFixtures};

#[tokio::test]
async fn test_response_json() {
    let upstream = MockProvider::start().await;
    upstream
        .mock_stream("/v1/chat/completions", StreamFixtures::openai_text(&["Hello", "!"]))
        .await;
    let server = test_server(test_config(&upstream.uri()));

    let response = server
        .post("/v1/responses")
        .json(&json!({
            "model": "gpt-4o-mini",
            "instructions": "Be kind.",
            "input": "Greet me",
            "max_output_tokens": 64
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["object"], "response");
    assert_eq!(body["status"], "completed");
    assert_eq!(body["instructions"], "Be kind.");
    assert_eq!(body["output"][0]["type"], "message");
    assert_eq!(body["output"][0]["content"][0]["type"], "output_text");
    assert_eq!(body["output"][0]["content"][0]["text"], "Hello!");
    assert_eq!(body["usage"]["input_tokens"], 9);
    assert_eq!(body["usage"]["output_tokens"], 12);

    let sent = upstream.received_bodies().await;
    assert_eq!(sent[0]["max_tokens"], 64);
    assert_eq!(
        sent[0]["messages"],
        json!([
            {"role": "system", "content": "Be kind."},
            {"role": "user", "content": "Greet me"}
        ])
    );
}

#[tokio::test]
async fn test_response_event_lifecycle() {
    let upstream = MockProvider::start().await;
    let long_text = "a".repeat(1200);
    upstream
        .mock_stream("/v1/chat/completions", StreamFixtures::openai_text(&[&long_text]))
        .await;
    let server = test_server(test_config(&upstream.uri()));

    let response = server
        .post("/v1/responses")
        .json(&json!({"model": "gpt-4o-mini", "input": "Write a lot", "stream": true}))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.header("content-type"), "text/event-stream");

    let text = response.text();
    assert_eq!(
        sse_events(&text),
        vec![
            "response.created",
            "response.in_progress",
            "response.output_item.added",
            "response.content_part.added",
            "response.output_text.delta",
            "response.output_text.delta",
            "response.output_text.delta",
            "response.output_text.done",
            "response.content_part.done",
            "response.output_item.done",
            "response.completed",
        ]
    );

    let payloads: Vec<Value> = sse_data(&text)
        .iter()
        .map(|p| serde_json::from_str(p).unwrap())
        .collect();
    let delta_lengths: Vec<usize> = payloads
        .iter()
        .filter(|p| p["type"] == "response.output_text.delta")
        .map(|p| p["delta"].as_str().unwrap().chars().count())
        .collect();
    assert_eq!(delta_lengths, vec![500, 500, 200]);

    let sequence: Vec<u64> = payloads
        .iter()
        .map(|p| p["sequence_number"].as_u64().unwrap())
        .collect();
    assert_eq!(sequence, (0..payloads.len() as u64).collect::<Vec<_>>());

    let completed = payloads.last().unwrap();
    assert_eq!(completed["response"]["status"], "completed");
    assert_eq!(
        completed["response"]["output"][0]["content"][0]["text"].as_str().map(str::len),
        Some(1200)
    );
}

#[tokio::test]
async fn test_truncated_response_is_incomplete() {
    let upstream = MockProvider::start().await;
    upstream
        .mock_stream("/v1/chat/completions", StreamFixtures::openai_truncated("cut sho"))
        .await;
    let server = test_server(test_config(&upstream.uri()));

    let response = server
        .post("/v1/responses")
        .json(&json!({"model": "gpt-4o-mini", "input": "Go", "stream": true}))
        .await;

    let text = response.text();
    assert_eq!(sse_events(&text), vec!["response.incomplete"]);
    let payload: Value = serde_json::from_str(&sse_data(&text)[0]).unwrap();
    assert_eq!(payload["response"]["status"], "incomplete");
    assert_eq!(
        payload["response"]["incomplete_details"],
        json!({"reason": "max_output_tokens"})
    );
}

#[tokio::test]
async fn test_stream_failure_replays_as_failed() {
    let upstream = MockProvider::start().await;
    upstream
        .mock_stream("/v1/chat/completions", StreamFixtures::openai_error_midway())
        .await;
    let server = test_server(test_config(&upstream.uri()));

    let response = server
        .post("/v1/responses")
        .json(&json!({"model": "gpt-4o-mini", "input": "Go", "stream": true}))
        .await;

    let text = response.text();
    let events = sse_events(&text);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0], "error");

    let payload: Value = serde_json::from_str(&sse_data(&text)[0]).unwrap();
    assert_eq!(payload["message"], "model overloaded");
    assert_eq!(payload["code"], "provider_error");
}

#[tokio::test]
async fn test_stream_failure_json_is_bad_gateway() {
    let upstream = MockProvider::start().await;
    upstream
        .mock_stream("/v1/chat/completions", StreamFixtures::openai_error_midway())
        .await;
    let server = test_server(test_config(&upstream.uri()));

    let response = server
        .post("/v1/responses")
        .json(&json!({"model": "gpt-4o-mini", "input": "Go"}))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_responses_through_anthropic() {
    let upstream = MockProvider::start().await;
    upstream
        .mock_stream("/v1/messages", StreamFixtures::anthropic_text(&["Bonjour"]))
        .await;
    let server = test_server(test_config(&upstream.uri()));

    let (name, value) = provider_header("anthropic");
    let response = server
        .post("/v1/responses")
        .add_header(name, value)
        .json(&json!({
            "model": "claude-sonnet-4",
            "instructions": "Speak French.",
            "input": [{"type": "message", "role": "user", "content": "Hello"}]
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["id"], "msg_mock");
    assert_eq!(body["output"][0]["content"][0]["text"], "Bonjour");

    let sent = upstream.received_bodies().await;
    assert_eq!(sent[0]["system"], "Speak French.");
}
