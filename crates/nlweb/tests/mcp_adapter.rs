use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use nlweb::{
    BackendEndpoint, BackendManager, BackendRegistry, ChatClient, McpAdapter, NLWebConfig,
    NLWebResult, QueryService,
};
use nlweb_test_utils::{MockBackend, MockChatClient};

fn adapter(backend: MockBackend, chat: Option<MockChatClient>) -> McpAdapter {
    let config = Arc::new(NLWebConfig::default());
    let mut registry = BackendRegistry::new();
    registry
        .register(
            BackendEndpoint {
                id: "mock".to_string(),
                enabled: true,
                backend_type: "mock".to_string(),
                priority: 0,
                properties: HashMap::new(),
            },
            Arc::new(backend),
        )
        .unwrap();
    let manager = BackendManager::new(registry, config.multi_backend.clone());
    let chat: Option<Arc<dyn ChatClient>> = match chat {
        Some(chat) => Some(Arc::new(chat)),
        None => None,
    };
    McpAdapter::new(Arc::new(QueryService::new(config, manager, chat).unwrap()))
}

fn backend() -> MockBackend {
    MockBackend::returning(vec![
        NLWebResult::new("First", "https://a/1", 0.9).with_description("first hit"),
        NLWebResult::new("Second", "https://a/2", 0.456).with_description("second hit"),
    ])
}

#[test]
fn test_list_tools_catalog() {
    let adapter = adapter(backend(), None);
    let tools = adapter.list_tools();
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["nlweb_search", "nlweb_query_history"]);
    assert_eq!(tools[0].input_schema["required"][0], "query");
}

#[test]
fn test_list_prompts_catalog() {
    let adapter = adapter(backend(), None);
    let prompts = adapter.list_prompts();
    let names: Vec<&str> = prompts.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "nlweb_search_prompt",
            "nlweb_summarize_prompt",
            "nlweb_generate_prompt"
        ]
    );
}

#[tokio::test]
async fn test_call_tool_search_formats_text_block() {
    let adapter = adapter(backend(), None);
    let response = adapter
        .call_tool(
            "nlweb_search",
            &json!({"query": "test", "mode": "list"}),
            &CancellationToken::new(),
        )
        .await;

    assert!(!response.is_error);
    assert_eq!(response.content.len(), 1);
    let text = &response.content[0].text;
    assert!(text.contains("Query ID:"));
    assert!(text.contains("Results Count: 2"));
    assert!(text.contains("1. First"));
    assert!(text.contains("URL: https://a/1"));
    assert!(text.contains("Score: 0.90"));
    // Two-decimal rounding
    assert!(text.contains("Score: 0.46"));
    assert!(!text.contains("Summary:"));
}

#[tokio::test]
async fn test_call_tool_summarize_includes_summary_line() {
    let adapter = adapter(backend(), Some(MockChatClient::replying("the gist")));
    let response = adapter
        .call_tool(
            "nlweb_search",
            &json!({"query": "test", "mode": "summarize"}),
            &CancellationToken::new(),
        )
        .await;
    assert!(!response.is_error);
    assert!(response.content[0].text.contains("Summary: the gist"));
}

#[tokio::test]
async fn test_call_tool_unknown_name() {
    let adapter = adapter(backend(), None);
    let response = adapter
        .call_tool("unknown", &json!({}), &CancellationToken::new())
        .await;
    assert!(response.is_error);
    assert_eq!(response.content[0].text, "Unknown tool: unknown");
}

#[tokio::test]
async fn test_call_tool_missing_query() {
    let adapter = adapter(backend(), None);
    let response = adapter
        .call_tool("nlweb_search", &json!({}), &CancellationToken::new())
        .await;
    assert!(response.is_error);
    assert!(response.content[0].text.contains("Missing required argument"));
}

#[tokio::test]
async fn test_call_tool_invalid_mode() {
    let adapter = adapter(backend(), None);
    let response = adapter
        .call_tool(
            "nlweb_search",
            &json!({"query": "x", "mode": "rank"}),
            &CancellationToken::new(),
        )
        .await;
    assert!(response.is_error);
    assert!(response.content[0].text.contains("unknown mode"));
}

#[tokio::test]
async fn test_call_tool_query_history() {
    let adapter = adapter(backend(), None);
    let response = adapter
        .call_tool(
            "nlweb_query_history",
            &json!({
                "query": "its hyperdrive",
                "previous_queries": ["millennium falcon", "crew size"]
            }),
            &CancellationToken::new(),
        )
        .await;
    assert!(!response.is_error);
    assert!(response.content[0].text.contains("Results Count: 2"));
}

#[tokio::test]
async fn test_call_tool_backend_failure_is_error_response() {
    let adapter = adapter(MockBackend::failing(), None);
    let response = adapter
        .call_tool(
            "nlweb_search",
            &json!({"query": "x"}),
            &CancellationToken::new(),
        )
        .await;
    assert!(response.is_error);
    assert!(response.content[0].text.contains("Query failed"));
}

#[test]
fn test_get_prompt_search() {
    let adapter = adapter(backend(), None);
    let response = adapter.get_prompt(
        "nlweb_search_prompt",
        &json!({"topic": "rust async", "context": "tokio"}),
    );
    assert!(!response.is_error);
    assert_eq!(response.messages.len(), 1);
    assert!(response.messages[0].content.text.contains("rust async"));
    assert!(response.messages[0].content.text.contains("tokio"));
}

#[test]
fn test_get_prompt_summarize_default_count() {
    let adapter = adapter(backend(), None);
    let response = adapter.get_prompt("nlweb_summarize_prompt", &json!({"query": "q"}));
    assert!(!response.is_error);
    assert!(response.messages[0].content.text.contains("top 10"));
}

#[test]
fn test_get_prompt_missing_required_argument() {
    let adapter = adapter(backend(), None);
    let response = adapter.get_prompt("nlweb_search_prompt", &json!({}));
    assert!(response.is_error);
    assert!(response.description.contains("Missing required argument"));
}

#[test]
fn test_get_prompt_unknown_name() {
    let adapter = adapter(backend(), None);
    let response = adapter.get_prompt("nope", &json!({}));
    assert!(response.is_error);
    assert_eq!(response.description, "Unknown prompt: nope");
}
