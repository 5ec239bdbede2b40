//! HTTP-level tests for the provider backends.
//!
//! Each test stands up a wiremock server in place of the provider API and
//! checks both the outgoing request shape and how responses map onto
//! `Error::Request` (api_error) and `Error::Inference` (model_error).

use avgpay_core::{Error, GenerationBackend};
use avgpay_inference::anthropic::{AnthropicBackend, AnthropicConfig, ANTHROPIC_VERSION};
use avgpay_inference::openai::{OpenAIBackend, OpenAIConfig};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn openai_backend(server: &MockServer) -> OpenAIBackend {
    let config = OpenAIConfig::default()
        .with_base_url(server.uri())
        .with_api_key("sk-test")
        .with_model("gpt-4o-mini");
    OpenAIBackend::new(config).expect("Failed to create backend")
}

fn anthropic_backend(server: &MockServer) -> AnthropicBackend {
    let config = AnthropicConfig::default()
        .with_base_url(server.uri())
        .with_api_key("ak-test")
        .with_model("claude-3-5-haiku-latest");
    AnthropicBackend::new(config).expect("Failed to create backend")
}

// =============================================================================
// OPENAI-COMPATIBLE
// =============================================================================

#[tokio::test]
async fn test_openai_sends_system_and_user_messages() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "messages": [
                {"role": "system", "content": "Respond with JSON only."},
                {"role": "user", "content": "Describe Acme"}
            ],
            "response_format": {"type": "json_object"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-123",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "{\"summary\": \"Acme\"}"},
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let text = openai_backend(&mock_server)
        .generate_with_system("Respond with JSON only.", "Describe Acme")
        .await
        .unwrap();
    assert_eq!(text, "{\"summary\": \"Acme\"}");
}

#[tokio::test]
async fn test_openrouter_headers_sent_in_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("HTTP-Referer", "https://avgpay.example"))
        .and(header("X-Title", "AvgPay"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "{}"}, "finish_reason": "stop"}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = OpenAIConfig {
        provider: "openrouter".to_string(),
        base_url: mock_server.uri(),
        api_key: Some("or-key".to_string()),
        json_mode: false,
        http_referer: Some("https://avgpay.example".to_string()),
        x_title: Some("AvgPay".to_string()),
        ..OpenAIConfig::default()
    };
    let backend = OpenAIBackend::new(config).unwrap();

    let result = backend.generate("hi").await;
    assert!(result.is_ok(), "Request should succeed: {:?}", result.err());
    assert_eq!(backend.provider_name(), "openrouter");
}

#[tokio::test]
async fn test_openai_server_error_is_request_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": {"message": "The server had an error", "type": "server_error"}
        })))
        .mount(&mock_server)
        .await;

    let err = openai_backend(&mock_server).generate("x").await.unwrap_err();
    assert!(matches!(err, Error::Request(_)), "got {err:?}");
    assert!(err.to_string().contains("The server had an error"));
}

#[tokio::test]
async fn test_openai_inline_error_is_inference_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": {"message": "Provider returned error", "code": 502}
        })))
        .mount(&mock_server)
        .await;

    let err = openai_backend(&mock_server).generate("x").await.unwrap_err();
    assert!(matches!(err, Error::Inference(_)), "got {err:?}");
}

#[tokio::test]
async fn test_openai_content_filter_is_inference_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": null}, "finish_reason": "content_filter"}]
        })))
        .mount(&mock_server)
        .await;

    let err = openai_backend(&mock_server).generate("x").await.unwrap_err();
    assert!(matches!(err, Error::Inference(_)), "got {err:?}");
}

#[tokio::test]
async fn test_openai_non_json_body_is_request_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&mock_server)
        .await;

    let err = openai_backend(&mock_server).generate("x").await.unwrap_err();
    assert!(matches!(err, Error::Request(_)), "got {err:?}");
}

// =============================================================================
// ANTHROPIC
// =============================================================================

#[tokio::test]
async fn test_anthropic_sends_version_and_key_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "ak-test"))
        .and(header("anthropic-version", ANTHROPIC_VERSION))
        .and(body_partial_json(json!({
            "model": "claude-3-5-haiku-latest",
            "system": "Respond with JSON only.",
            "messages": [{"role": "user", "content": "Describe Austin"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "{\"summary\": \"Austin\"}"}],
            "stop_reason": "end_turn"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let text = anthropic_backend(&mock_server)
        .generate_with_system("Respond with JSON only.", "Describe Austin")
        .await
        .unwrap();
    assert_eq!(text, "{\"summary\": \"Austin\"}");
}

#[tokio::test]
async fn test_anthropic_overloaded_is_request_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_json(json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        })))
        .mount(&mock_server)
        .await;

    let err = anthropic_backend(&mock_server)
        .generate("x")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Request(_)), "got {err:?}");
    assert!(err.to_string().contains("Overloaded"));
}

#[tokio::test]
async fn test_anthropic_error_envelope_with_200_is_inference_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "error",
            "error": {"type": "api_error", "message": "upstream failed"}
        })))
        .mount(&mock_server)
        .await;

    let err = anthropic_backend(&mock_server)
        .generate("x")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Inference(_)), "got {err:?}");
}

#[tokio::test]
async fn test_anthropic_empty_content_is_inference_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "message",
            "content": [],
            "stop_reason": "end_turn"
        })))
        .mount(&mock_server)
        .await;

    let err = anthropic_backend(&mock_server)
        .generate("x")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Inference(_)), "got {err:?}");
}
