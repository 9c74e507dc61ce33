//! Chat-completion client tests against a mock HTTP server.

mod common;

use serde_json::json;
use std::time::Duration;
use toolsift::catalog::Catalog;
use toolsift::config::LlmConfig;
use toolsift::llm::{ChatClient, ToolSelector};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(base_url: String, timeout: Duration) -> ChatClient {
    ChatClient::new(LlmConfig {
        api_key: "sk-test".to_string(),
        base_url,
        model: "gpt-4o".to_string(),
        max_tokens: 1000,
        temperature: 0.1,
        timeout,
    })
    .unwrap()
}

fn catalog() -> Catalog {
    Catalog::from_json(&common::scenario_catalog()).unwrap()
}

#[tokio::test]
async fn test_select_parses_tool_calls_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"model": "gpt-4o", "tool_choice": "auto"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "pagerduty__create_incident",
                            "arguments": "{\"service\":\"payments\"}"
                        }
                    }]
                }
            }],
            "usage": {"prompt_tokens": 812, "completion_tokens": 24, "total_tokens": 836}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let catalog = catalog();
    let selection = client(server.uri(), Duration::from_secs(30))
        .select("create incident for payment outage", catalog.tools())
        .await;

    assert!(selection.error.is_none());
    assert_eq!(selection.tools_used, vec!["pagerduty.create_incident"]);
    assert_eq!(selection.input_tokens, 812);
    assert_eq!(selection.output_tokens, 24);
    assert!((selection.cost - (812.0 * 4.25e-6 + 24.0 * 17e-6)).abs() < 1e-12);
}

#[tokio::test]
async fn test_http_error_becomes_failed_selection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let catalog = catalog();
    let selection = client(server.uri(), Duration::from_secs(30))
        .select("show open tickets", catalog.tools())
        .await;

    let error = selection.error.as_deref().unwrap();
    assert!(error.contains("500"));
    assert_eq!(selection.total_tokens(), 0);
    assert_eq!(selection.cost, 0.0);
    assert!(selection.tools_used.is_empty());
}

#[tokio::test]
async fn test_timeout_becomes_failed_selection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"choices": []}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let catalog = catalog();
    let selection = client(server.uri(), Duration::from_millis(200))
        .select("show open tickets", catalog.tools())
        .await;

    assert!(selection.is_failed());
    assert_eq!(selection.total_tokens(), 0);
}

#[tokio::test]
async fn test_unreachable_endpoint_becomes_failed_selection() {
    // Nothing listens on port 9 (discard) in the test environment
    let selection = client("http://127.0.0.1:9".to_string(), Duration::from_secs(2))
        .select("show open tickets", catalog().tools())
        .await;

    assert!(selection.is_failed());
    assert!(selection.tools_used.is_empty());
}
