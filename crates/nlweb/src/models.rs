//! Request and response types for the NLWeb query pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::NLWebConfig;
use crate::error::{Error, Result};

/// Response shaping mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Ranked hits only; `summary` stays null
    #[default]
    List,
    /// Hits plus a chat-written summary of the top snippets
    Summarize,
    /// Hits plus a retrieval-augmented generated answer
    Generate,
}

impl Mode {
    /// Canonical lowercase name, as used on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::List => "list",
            Mode::Summarize => "summarize",
            Mode::Generate => "generate",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "list" => Ok(Mode::List),
            "summarize" => Ok(Mode::Summarize),
            "generate" => Ok(Mode::Generate),
            other => Err(Error::InvalidArgument(format!("unknown mode: {other}"))),
        }
    }
}

/// An incoming natural-language query.
///
/// Accepted both as a JSON body (`POST /ask`) and as URL parameters
/// (`GET /ask`). Immutable once validated.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NLWebRequest {
    /// Caller-supplied id; the server generates one when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,

    /// The raw natural-language query
    #[serde(default)]
    pub query: String,

    /// Response shaping mode; falls back to the configured default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,

    /// Optional site scope for retrieval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,

    /// Comma-joined prior query ids, oldest first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,

    /// A caller-rewritten standalone query; passed through verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decontextualized_query: Option<String>,

    /// Stream the response as SSE frames; falls back to the configured default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming: Option<bool>,
}

impl NLWebRequest {
    /// Build a minimal request around a query string.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Prior queries parsed out of `prev`, in order, empties dropped.
    #[must_use]
    pub fn prev_queries(&self) -> Vec<&str> {
        self.prev
            .as_deref()
            .map(|prev| {
                prev.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The mode this request runs under.
    #[must_use]
    pub fn effective_mode(&self, config: &NLWebConfig) -> Mode {
        self.mode.unwrap_or(config.default_mode)
    }

    /// Whether this request streams its response.
    #[must_use]
    pub fn effective_streaming(&self, config: &NLWebConfig) -> bool {
        self.streaming.unwrap_or(config.enable_streaming)
    }

    /// The site scope this request runs under.
    #[must_use]
    pub fn effective_site<'a>(&'a self, config: &'a NLWebConfig) -> Option<&'a str> {
        self.site.as_deref().or(config.default_site.as_deref())
    }

    /// Validate the query against configured limits.
    ///
    /// Must pass before any backend call is made.
    pub fn validate(&self, config: &NLWebConfig) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(Error::InvalidArgument("query is required".into()));
        }
        let length = self.query.chars().count();
        if length > config.max_query_length {
            return Err(Error::InvalidArgument(format!(
                "query length {length} exceeds maximum {}",
                config.max_query_length
            )));
        }
        Ok(())
    }
}

/// One scored hit from a data backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NLWebResult {
    /// Display name; serialized as `title` on the wire
    #[serde(rename = "title", alias = "name")]
    pub name: String,

    /// Source URL; the dedup key when deduplication is enabled
    pub url: String,

    /// Relevance in `[0.0, 1.0]`, higher is better
    pub score: f64,

    /// Short description; serialized as `snippet` on the wire
    #[serde(rename = "snippet", alias = "description", default)]
    pub description: String,

    /// Site the hit belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,

    /// Id of the backend that produced the hit
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub backend_source: String,
}

impl NLWebResult {
    /// Build a result with the given name, url and score.
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>, score: f64) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            score,
            description: String::new(),
            site: None,
            backend_source: String::new(),
        }
    }

    /// Attach a description snippet.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Attach a site scope.
    #[must_use]
    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    /// The URL normalized for deduplication: trimmed, lowercased.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        self.url.trim().to_lowercase()
    }
}

/// The assembled answer for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NLWebResponse {
    /// Echo of the request id (generated when the request carried none)
    pub query_id: String,
    /// The raw query as received
    pub query: String,
    /// The standalone rewrite actually used for retrieval
    pub decontextualized_query: String,
    /// Mode the response was shaped under
    pub mode: Mode,
    /// Ranked hits, score-descending
    pub results: Vec<NLWebResult>,
    /// Summary or generated answer; null in List mode
    pub summary: Option<String>,
    /// Site scope the query ran under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    /// When the response was assembled
    pub generated_at: DateTime<Utc>,
    /// Non-fatal degradation notices (decontextualization fallback, chat degradation)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Payload of a terminal `error` stream frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameError {
    /// Human-readable failure description
    pub message: String,
}

/// One Server-Sent-Events frame of a streaming response.
///
/// Serialized as `{"type": T, "data": D}`. Frames are emitted in a fixed
/// order: `query_id` first, then `decontextualized_query`, zero or more
/// `result` frames, an optional `summary`, and exactly one of
/// `complete` / `error` last.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamFrame {
    /// The request's id; always the first frame
    QueryId(String),
    /// The standalone rewrite used for retrieval
    DecontextualizedQuery(String),
    /// One merged, ranked hit
    Result(NLWebResult),
    /// Summary or generated answer
    Summary(String),
    /// Terminal success frame; carries `data: null`
    Complete(()),
    /// Terminal failure frame; mutually exclusive with `complete`
    Error(FrameError),
}

impl StreamFrame {
    /// Whether this frame terminates the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamFrame::Complete(()) | StreamFrame::Error(_))
    }
}
