//! Integration tests for the OpenAI provider
//!
//! Behavioural contracts against a mocked `/chat/completions` endpoint:
//! - response and token usage parsing
//! - JSON output mode in the request body
//! - error mapping and retry on rate limits

use nirava::llm::provider::{CompletionRequest, FinishReason, LlmError, LlmProvider};
use nirava::llm::providers::openai::{OpenAiConfig, OpenAiProvider};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(base_url: &str) -> OpenAiConfig {
    OpenAiConfig {
        api_key: "test-api-key".to_string(),
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(5),
    }
}

fn success_body(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "model": "gpt-4o-mini",
        "choices": [
            {
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }
        ],
        "usage": {"prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20}
    })
}

#[tokio::test]
async fn test_openai_provider_returns_completion_with_usage() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body("Drink some water.")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let response = provider
        .complete(CompletionRequest::from_prompt("gpt-4o-mini", "How do I feel better?"))
        .await
        .unwrap();

    assert_eq!(response.text(), "Drink some water.");
    assert_eq!(response.model, "gpt-4o-mini");
    assert_eq!(response.usage.total_tokens, 20);
    assert!(matches!(response.finish_reason, FinishReason::Stop));
    assert!(response.citations.is_empty());
}

#[tokio::test]
async fn test_openai_provider_sends_json_response_format() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "response_format": {"type": "json_object"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body(r#"{"ok": true}"#)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let request = CompletionRequest::from_prompt("gpt-4o-mini", "Return JSON").with_json_output();
    let response = provider.complete(request).await.unwrap();

    assert_eq!(response.text(), r#"{"ok": true}"#);
}

#[tokio::test]
async fn test_openai_provider_serves_grounded_requests_as_plain_completions() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body("Sleep matters.")))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let request = CompletionRequest::from_prompt("gpt-4o-mini", "Research sleep").with_grounding(true);
    let response = provider.complete(request).await.unwrap();

    assert_eq!(response.text(), "Sleep matters.");
    assert!(response.citations.is_empty());
}

#[tokio::test]
async fn test_openai_provider_maps_401_to_authentication_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string(
            r#"{"error": {"message": "Incorrect API key provided"}}"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let result = provider
        .complete(CompletionRequest::from_prompt("gpt-4o-mini", "hi"))
        .await;

    assert!(matches!(result, Err(LlmError::AuthenticationFailed(_))));
}

#[tokio::test]
async fn test_openai_provider_retries_after_rate_limit() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body("Recovered.")))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let response = provider
        .complete(CompletionRequest::from_prompt("gpt-4o-mini", "hi"))
        .await
        .unwrap();

    assert_eq!(response.text(), "Recovered.");
}

#[tokio::test]
async fn test_openai_provider_gives_up_after_repeated_server_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(4)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let result = provider
        .complete(CompletionRequest::from_prompt("gpt-4o-mini", "hi"))
        .await;

    assert!(matches!(result, Err(LlmError::ApiError(_))));
}

#[tokio::test]
async fn test_openai_health_check() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    assert!(provider.health_check().await.is_ok());
    assert_eq!(provider.name(), "openai");
}

#[tokio::test]
async fn test_openai_provider_serves_concurrent_requests() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body("Rest well.")))
        .expect(3)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let requests = ["sleep", "stress", "energy"]
        .into_iter()
        .map(|topic| provider.complete(CompletionRequest::from_prompt("gpt-4o-mini", topic)));

    let responses = futures::future::join_all(requests).await;

    assert_eq!(responses.len(), 3);
    for response in responses {
        assert_eq!(response.unwrap().text(), "Rest well.");
    }
}
