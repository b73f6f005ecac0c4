//! HTTP-level tests of the Gemini adapter against a local mock server.

use ao_core::traits::ProviderClient;
use ao_core::types::{ProviderError, ProviderRequest};
use config::{ProviderConfig, ProviderKind};
use engine::provider::gemini::GeminiClient;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> ProviderConfig {
    ProviderConfig {
        kind: ProviderKind::Gemini,
        model: "gemini-pro".to_string(),
        base_url: server.uri(),
        api_key_env: "UNUSED".to_string(),
        attempt_timeout_seconds: 5,
        request_timeout_seconds: 10
    }
}

fn request() -> ProviderRequest {
    ProviderRequest {
        model: "gemini-pro".to_string(),
        system_prompt: "You are a data analysis engine.".to_string(),
        user_prompt: "Summarize the quarter.".to_string()
    }
}

#[tokio::test]
async fn successful_call_parses_text_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-pro:generateContent"))
        .and(query_param("key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [{"parts": [{"text": "Summarize the quarter."}]}],
            "systemInstruction": {"parts": [{"text": "You are a data analysis engine."}]}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [
                {"content": {"parts": [{"text": "Revenue grew 12%."}]}}
            ],
            "usageMetadata": {
                "promptTokenCount": 42,
                "candidatesTokenCount": 7
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = GeminiClient::with_key(&config_for(&server), "test-key".to_string()).unwrap();
    let response = client.call(&request()).await.unwrap();

    assert_eq!(response.text, "Revenue grew 12%.");
    assert_eq!(response.metadata.model, "gemini-pro");
    assert_eq!(response.metadata.prompt_tokens, 42);
    assert_eq!(response.metadata.completion_tokens, 7);
}

#[tokio::test]
async fn rate_limit_carries_the_retry_after_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let client = GeminiClient::with_key(&config_for(&server), "k".to_string()).unwrap();
    let err = client.call(&request()).await.unwrap_err();

    match err {
        ProviderError::RateLimited {
            retry_after_seconds
        } => assert_eq!(retry_after_seconds, 7),
        other => panic!("expected RateLimited, got {other}")
    }
}

#[tokio::test]
async fn rate_limit_without_header_defaults_the_window() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let client = GeminiClient::with_key(&config_for(&server), "k".to_string()).unwrap();
    let err = client.call(&request()).await.unwrap_err();
    assert!(matches!(
        err,
        ProviderError::RateLimited {
            retry_after_seconds: 60
        }
    ));
}

#[tokio::test]
async fn auth_failure_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("API key not valid"))
        .mount(&server)
        .await;

    let client = GeminiClient::with_key(&config_for(&server), "bad".to_string()).unwrap();
    let err = client.call(&request()).await.unwrap_err();

    match err {
        ProviderError::Fatal { reason } => assert!(reason.contains("API key not valid")),
        other => panic!("expected Fatal, got {other}")
    }
}

#[tokio::test]
async fn server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = GeminiClient::with_key(&config_for(&server), "k".to_string()).unwrap();
    let err = client.call(&request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::Transient { .. }));
}

#[tokio::test]
async fn empty_candidate_list_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    let client = GeminiClient::with_key(&config_for(&server), "k".to_string()).unwrap();
    let err = client.call(&request()).await.unwrap_err();

    match err {
        ProviderError::Transient { reason } => assert!(reason.contains("no candidates")),
        other => panic!("expected Transient, got {other}")
    }
}
