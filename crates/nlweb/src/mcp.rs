//! Model Context Protocol adapter over the query pipeline.
//!
//! Exposes the same capabilities as `/ask` through the MCP envelope:
//! `list_tools`, `list_prompts`, `call_tool`, `get_prompt`. Validation
//! failures never escape as errors; they become well-formed responses with
//! `is_error = true` so the HTTP surface can always answer 200.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::models::{Mode, NLWebRequest, NLWebResponse};
use crate::query::QueryService;

/// A tool catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    /// Stable identifier used by MCP callers
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON Schema of the accepted arguments
    pub input_schema: Value,
}

/// One declared prompt argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpPromptArgument {
    /// Argument name
    pub name: String,
    /// What the argument controls
    pub description: String,
    /// Whether the argument must be supplied
    pub required: bool,
}

/// A prompt catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpPrompt {
    /// Stable identifier used by MCP callers
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Declared arguments
    pub arguments: Vec<McpPromptArgument>,
}

/// A single content item of a tool response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpContent {
    /// Content kind; always "text" here
    #[serde(rename = "type")]
    pub content_type: String,
    /// The text payload
    pub text: String,
}

impl McpContent {
    /// A text content item.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".to_string(),
            text: text.into(),
        }
    }
}

/// Response envelope for `call_tool`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolResponse {
    /// Content items; a single text item on both success and failure
    pub content: Vec<McpContent>,
    /// Whether the call failed
    pub is_error: bool,
}

impl McpToolResponse {
    fn success(text: impl Into<String>) -> Self {
        Self {
            content: vec![McpContent::text(text)],
            is_error: false,
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![McpContent::text(text)],
            is_error: true,
        }
    }
}

/// One rendered prompt message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpPromptMessage {
    /// Speaker role
    pub role: String,
    /// Message content
    pub content: McpContent,
}

/// Response envelope for `get_prompt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpPromptResponse {
    /// Prompt description, or the failure reason
    pub description: String,
    /// Rendered messages; empty on failure
    pub messages: Vec<McpPromptMessage>,
    /// Whether rendering failed
    pub is_error: bool,
}

impl McpPromptResponse {
    fn error(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            messages: Vec::new(),
            is_error: true,
        }
    }
}

/// Wraps the [`QueryService`] behind the MCP operations.
pub struct McpAdapter {
    service: Arc<QueryService>,
}

impl McpAdapter {
    /// Build an adapter over a shared service.
    #[must_use]
    pub fn new(service: Arc<QueryService>) -> Self {
        Self { service }
    }

    /// The static tool catalog.
    #[must_use]
    pub fn list_tools(&self) -> Vec<McpTool> {
        vec![
            McpTool {
                name: "nlweb_search".to_string(),
                description: "Search NLWeb-connected backends with a natural-language query"
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "The natural-language query" },
                        "mode": { "type": "string", "enum": ["list", "summarize", "generate"] },
                        "site": { "type": "string", "description": "Optional site scope" },
                        "streaming": { "type": "boolean", "description": "Ignored; MCP responses are unary" }
                    },
                    "required": ["query"]
                }),
            },
            McpTool {
                name: "nlweb_query_history".to_string(),
                description: "Query with conversation history for decontextualization".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "The latest query" },
                        "previous_queries": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Prior queries, oldest first"
                        },
                        "mode": { "type": "string", "enum": ["list", "summarize", "generate"] }
                    },
                    "required": ["query"]
                }),
            },
        ]
    }

    /// The static prompt catalog.
    #[must_use]
    pub fn list_prompts(&self) -> Vec<McpPrompt> {
        vec![
            McpPrompt {
                name: "nlweb_search_prompt".to_string(),
                description: "Template for searching a topic".to_string(),
                arguments: vec![
                    McpPromptArgument {
                        name: "topic".to_string(),
                        description: "Topic to search for".to_string(),
                        required: true,
                    },
                    McpPromptArgument {
                        name: "context".to_string(),
                        description: "Additional context to scope the search".to_string(),
                        required: false,
                    },
                ],
            },
            McpPrompt {
                name: "nlweb_summarize_prompt".to_string(),
                description: "Template for summarizing search results".to_string(),
                arguments: vec![
                    McpPromptArgument {
                        name: "query".to_string(),
                        description: "Query whose results should be summarized".to_string(),
                        required: true,
                    },
                    McpPromptArgument {
                        name: "result_count".to_string(),
                        description: "How many results to cover".to_string(),
                        required: false,
                    },
                ],
            },
            McpPrompt {
                name: "nlweb_generate_prompt".to_string(),
                description: "Template for generating an answer from retrieval".to_string(),
                arguments: vec![
                    McpPromptArgument {
                        name: "question".to_string(),
                        description: "Question to answer".to_string(),
                        required: true,
                    },
                    McpPromptArgument {
                        name: "style".to_string(),
                        description: "Optional answer style (e.g. brief, detailed)".to_string(),
                        required: false,
                    },
                ],
            },
        ]
    }

    /// Run a tool call through the unary pipeline.
    ///
    /// Never returns an error: every failure becomes `is_error = true`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: &Value,
        cancel: &CancellationToken,
    ) -> McpToolResponse {
        let request = match name {
            "nlweb_search" => build_search_request(arguments),
            "nlweb_query_history" => build_history_request(arguments),
            other => return McpToolResponse::error(format!("Unknown tool: {other}")),
        };
        let request = match request {
            Ok(request) => request,
            Err(reason) => return McpToolResponse::error(reason),
        };

        match self.service.process(&request, cancel).await {
            Ok(response) => McpToolResponse::success(format_tool_text(&response)),
            Err(err) => McpToolResponse::error(format!("Query failed: {err}")),
        }
    }

    /// Render a prompt template.
    #[must_use]
    pub fn get_prompt(&self, name: &str, arguments: &Value) -> McpPromptResponse {
        let rendered = match name {
            "nlweb_search_prompt" => {
                let Some(topic) = string_argument(arguments, "topic") else {
                    return McpPromptResponse::error("Missing required argument: topic");
                };
                let mut text = format!("Search for information about {topic}.");
                if let Some(context) = string_argument(arguments, "context") {
                    let _ = write!(text, " Focus on: {context}.");
                }
                ("Search prompt", text)
            }
            "nlweb_summarize_prompt" => {
                let Some(query) = string_argument(arguments, "query") else {
                    return McpPromptResponse::error("Missing required argument: query");
                };
                let count = arguments
                    .get("result_count")
                    .and_then(Value::as_u64)
                    .unwrap_or(10);
                (
                    "Summarize prompt",
                    format!("Summarize the top {count} search results for \"{query}\" into a short, factual overview."),
                )
            }
            "nlweb_generate_prompt" => {
                let Some(question) = string_argument(arguments, "question") else {
                    return McpPromptResponse::error("Missing required argument: question");
                };
                let mut text = format!(
                    "Answer the question \"{question}\" using retrieved search results as grounding."
                );
                if let Some(style) = string_argument(arguments, "style") {
                    let _ = write!(text, " Answer style: {style}.");
                }
                ("Generate prompt", text)
            }
            other => return McpPromptResponse::error(format!("Unknown prompt: {other}")),
        };

        McpPromptResponse {
            description: rendered.0.to_string(),
            messages: vec![McpPromptMessage {
                role: "user".to_string(),
                content: McpContent::text(rendered.1),
            }],
            is_error: false,
        }
    }
}

fn string_argument(arguments: &Value, key: &str) -> Option<String> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_mode(arguments: &Value) -> Result<Option<Mode>, String> {
    match arguments.get("mode") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => raw
            .parse::<Mode>()
            .map(Some)
            .map_err(|err| err.to_string()),
        Some(other) => Err(format!("Invalid mode: {other}")),
    }
}

fn build_search_request(arguments: &Value) -> Result<NLWebRequest, String> {
    let Some(query) = string_argument(arguments, "query") else {
        return Err("Missing required argument: query".to_string());
    };
    Ok(NLWebRequest {
        query,
        mode: parse_mode(arguments)?,
        site: string_argument(arguments, "site"),
        // MCP responses are always unary
        streaming: Some(false),
        ..NLWebRequest::default()
    })
}

fn build_history_request(arguments: &Value) -> Result<NLWebRequest, String> {
    let Some(query) = string_argument(arguments, "query") else {
        return Err("Missing required argument: query".to_string());
    };
    let prev = arguments
        .get("previous_queries")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(",")
        })
        .filter(|joined| !joined.is_empty());

    Ok(NLWebRequest {
        query,
        mode: parse_mode(arguments)?,
        prev,
        streaming: Some(false),
        ..NLWebRequest::default()
    })
}

/// Render a response as the newline-delimited MCP text block.
fn format_tool_text(response: &NLWebResponse) -> String {
    let mut text = format!(
        "Query ID: {}\nResults Count: {}\n",
        response.query_id,
        response.results.len()
    );
    if let Some(summary) = &response.summary {
        let _ = writeln!(text, "Summary: {summary}");
    }
    for (index, result) in response.results.iter().enumerate() {
        let _ = write!(
            text,
            "\n{}. {}\n   URL: {}\n   Score: {:.2}\n   {}",
            index + 1,
            result.name,
            result.url,
            result.score,
            result.description
        );
        text.push('\n');
    }
    text
}

