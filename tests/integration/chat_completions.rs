//! Chat completions endpoint integration tests
//!
//! Tests for POST /v1/chat/completions against mocked upstreams:
//! - Aggregate mode for every provider family
//! - Forward mode chunk rendering and stream termination
//! - Request mapping as seen by the upstream
//! - Error surfaces (mapping, upstream status, mid-stream errors)

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::{provider_header, sse_data, test_config, test_server};
use crate::mocks::{MockProvider, StreamFixtures};

fn chat_body(model: &str, stream: bool) -> Value {
    json!({
        "model": model,
        "messages": [
            {"role": "system", "content": "Be terse."},
            {"role": "user", "content": "Say hello"}
        ],
        "temperature": 0.4,
        "stream": stream
    })
}

/// Concatenated `delta.content` of every forwarded chunk
fn streamed_text(payloads: &[String]) -> String {
    payloads
        .iter()
        .filter(|p| p.as_str() != "[DONE]")
        .filter_map(|p| serde_json::from_str::<Value>(p).ok())
        .filter_map(|chunk| {
            chunk["choices"][0]["delta"]["content"]
                .as_str()
                .map(str::to_string)
        })
        .collect()
}

#[tokio::test]
async fn test_openai_aggregate() {
    let upstream = MockProvider::start().await;
    upstream
        .mock_stream("/v1/chat/completions", StreamFixtures::openai_text(&["Hel", "lo ", "world"]))
        .await;
    let server = test_server(test_config(&upstream.uri()));

    let response = server
        .post("/v1/chat/completions")
        .json(&chat_body("gpt-4o-mini", false))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["id"], "chatcmpl-mock");
    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["choices"][0]["message"]["role"], "assistant");
    assert_eq!(body["choices"][0]["message"]["content"], "Hello world");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(
        body["usage"],
        json!({"prompt_tokens": 9, "completion_tokens": 12, "total_tokens": 21})
    );
}

#[tokio::test]
async fn test_upstream_always_streams() {
    let upstream = MockProvider::start().await;
    upstream
        .mock_stream("/v1/chat/completions", StreamFixtures::openai_text(&["ok"]))
        .await;
    let server = test_server(test_config(&upstream.uri()));

    server
        .post("/v1/chat/completions")
        .json(&chat_body("gpt-4o-mini", false))
        .await;

    let sent = upstream.received_bodies().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["stream"], json!(true));
    assert_eq!(sent[0]["stream_options"], json!({"include_usage": true}));
    assert_eq!(sent[0]["temperature"], json!(0.4));
}

#[tokio::test]
async fn test_openai_forward() {
    let upstream = MockProvider::start().await;
    upstream
        .mock_stream("/v1/chat/completions", StreamFixtures::openai_text(&["Hel", "lo"]))
        .await;
    let server = test_server(test_config(&upstream.uri()));

    let response = server
        .post("/v1/chat/completions")
        .json(&chat_body("gpt-4o-mini", true))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.header("content-type"), "text/event-stream");
    assert_eq!(response.header("cache-control"), "no-cache");

    let payloads = sse_data(&response.text());
    assert_eq!(streamed_text(&payloads), "Hello");
    assert_eq!(payloads.last().map(String::as_str), Some("[DONE]"));
    assert_eq!(payloads.iter().filter(|p| p.as_str() == "[DONE]").count(), 1);
}

#[tokio::test]
async fn test_anthropic_aggregate_and_mapping() {
    let upstream = MockProvider::start().await;
    upstream
        .mock_stream_with_header(
            "/v1/messages",
            "x-api-key",
            crate::common::constants::TEST_ANTHROPIC_API_KEY,
            StreamFixtures::anthropic_text(&["Hi", " there"]),
        )
        .await;
    let server = test_server(test_config(&upstream.uri()));

    let (name, value) = provider_header("anthropic");
    let response = server
        .post("/v1/chat/completions")
        .add_header(name, value)
        .json(&chat_body("claude-sonnet-4", false))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["id"], "msg_mock");
    assert_eq!(body["choices"][0]["message"]["content"], "Hi there");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["usage"]["prompt_tokens"], 14);
    assert_eq!(body["usage"]["completion_tokens"], 6);

    let sent = upstream.received_bodies().await;
    assert_eq!(sent[0]["system"], "Be terse.");
    assert_eq!(sent[0]["max_tokens"], 4096);
    assert_eq!(sent[0]["messages"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_anthropic_forward_ends_with_done() {
    let upstream = MockProvider::start().await;
    upstream
        .mock_stream("/v1/messages", StreamFixtures::anthropic_text(&["A", "B"]))
        .await;
    let server = test_server(test_config(&upstream.uri()));

    let (name, value) = provider_header("anthropic");
    let response = server
        .post("/v1/chat/completions")
        .add_header(name, value)
        .json(&chat_body("claude-sonnet-4", true))
        .await;

    let payloads = sse_data(&response.text());
    assert_eq!(streamed_text(&payloads), "AB");
    assert_eq!(payloads.last().map(String::as_str), Some("[DONE]"));
    assert!(!payloads.iter().any(|p| p.contains("ping")));
}

#[tokio::test]
async fn test_google_snapshots_are_diffed() {
    let upstream = MockProvider::start().await;
    upstream
        .mock_stream(
            "/v1beta/models/gemini-2.0-flash:streamGenerateContent",
            StreamFixtures::google_snapshots(&["Hel", "Hello", "Hello there"]),
        )
        .await;
    let server = test_server(test_config(&upstream.uri()));

    let (name, value) = provider_header("google");
    let response = server
        .post("/v1/chat/completions")
        .add_header(name, value)
        .json(&chat_body("gemini-2.0-flash", false))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["choices"][0]["message"]["content"], "Hello there");
    assert_eq!(body["usage"]["total_tokens"], 12);

    let sent = upstream.received_bodies().await;
    assert!(sent[0].get("model").is_none());
    assert_eq!(sent[0]["generationConfig"]["temperature"], json!(0.4));
    assert_eq!(sent[0]["systemInstruction"]["parts"][0]["text"], "Be terse.");
}

#[tokio::test]
async fn test_google_forward_emits_suffixes() {
    let upstream = MockProvider::start().await;
    upstream
        .mock_stream(
            "/v1beta/models/gemini-2.0-flash:streamGenerateContent",
            StreamFixtures::google_snapshots(&["Hel", "Hello", "Hello there"]),
        )
        .await;
    let server = test_server(test_config(&upstream.uri()));

    let (name, value) = provider_header("google");
    let response = server
        .post("/v1/chat/completions")
        .add_header(name, value)
        .json(&chat_body("gemini-2.0-flash", true))
        .await;

    let payloads = sse_data(&response.text());
    assert_eq!(streamed_text(&payloads), "Hello there");
    assert_eq!(payloads.last().map(String::as_str), Some("[DONE]"));
}

#[tokio::test]
async fn test_cohere_terminal_event_wins() {
    let upstream = MockProvider::start().await;
    upstream
        .mock_stream("/v1/chat", StreamFixtures::cohere_text(&["Bon", "jour"]))
        .await;
    let server = test_server(test_config(&upstream.uri()));

    let (name, value) = provider_header("cohere");
    let response = server
        .post("/v1/chat/completions")
        .add_header(name, value)
        .json(&chat_body("command-r", false))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["model"], "command-r");
    assert_eq!(body["choices"][0]["message"]["content"], "Bonjour");
    assert_eq!(body["usage"]["total_tokens"], 7);

    let sent = upstream.received_bodies().await;
    assert_eq!(sent[0]["message"], "Say hello");
    assert_eq!(sent[0]["preamble"], "Be terse.");
}

#[tokio::test]
async fn test_missing_required_parameter() {
    let upstream = MockProvider::start().await;
    let server = test_server(test_config(&upstream.uri()));

    let (name, value) = provider_header("anthropic");
    let response = server
        .post("/v1/chat/completions")
        .add_header(name, value)
        .json(&json!({"model": "claude-sonnet-4"}))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "missing_required_parameter");
    assert!(upstream.received_bodies().await.is_empty());
}

#[tokio::test]
async fn test_unknown_provider() {
    let upstream = MockProvider::start().await;
    let server = test_server(test_config(&upstream.uri()));

    let (name, value) = provider_header("nope");
    let response = server
        .post("/v1/chat/completions")
        .add_header(name, value)
        .json(&chat_body("gpt-4o-mini", false))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "unsupported");
}

#[tokio::test]
async fn test_invalid_json_body() {
    let upstream = MockProvider::start().await;
    let server = test_server(test_config(&upstream.uri()));

    let response = server
        .post("/v1/chat/completions")
        .text("{not json")
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn test_upstream_error_status_is_bad_gateway() {
    let upstream = MockProvider::start().await;
    upstream
        .mock_error(
            "/v1/chat/completions",
            401,
            json!({"error": {"message": "Invalid API key", "type": "invalid_request_error"}}),
        )
        .await;
    let server = test_server(test_config(&upstream.uri()));

    let response = server
        .post("/v1/chat/completions")
        .json(&chat_body("gpt-4o-mini", false))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert_eq!(body["error"]["message"], "Invalid API key");
    assert_eq!(body["error"]["provider"], "openai");
}

#[tokio::test]
async fn test_mid_stream_error_aggregate() {
    let upstream = MockProvider::start().await;
    upstream
        .mock_stream("/v1/chat/completions", StreamFixtures::openai_error_midway())
        .await;
    let server = test_server(test_config(&upstream.uri()));

    let response = server
        .post("/v1/chat/completions")
        .json(&chat_body("gpt-4o-mini", false))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert_eq!(body["error"]["message"], "model overloaded");
    assert_eq!(body["error"]["provider"], "openai");
}

#[tokio::test]
async fn test_mid_stream_error_forward() {
    let upstream = MockProvider::start().await;
    upstream
        .mock_stream("/v1/chat/completions", StreamFixtures::openai_error_midway())
        .await;
    let server = test_server(test_config(&upstream.uri()));

    let response = server
        .post("/v1/chat/completions")
        .json(&chat_body("gpt-4o-mini", true))
        .await;

    let payloads = sse_data(&response.text());
    assert_eq!(streamed_text(&payloads), "partial");
    let last: Value = serde_json::from_str(payloads.last().unwrap()).unwrap();
    assert_eq!(last["error"]["message"], "model overloaded");
    assert!(!payloads.iter().any(|p| p == "[DONE]"));
}

#[tokio::test]
async fn test_missing_api_key_is_unavailable() {
    let upstream = MockProvider::start().await;
    let server = test_server(conduit::Config::default());

    let response = server
        .post("/v1/chat/completions")
        .json(&chat_body("gpt-4o-mini", false))
        .await;

    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert!(body["error"]["message"].as_str().unwrap().contains("OPENAI_API_KEY"));
    assert!(upstream.received_bodies().await.is_empty());
}
