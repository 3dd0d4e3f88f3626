//! Configuration for the NLWeb query core.
//!
//! All tunables live in a single immutable [`NLWebConfig`] built at startup.
//! Every scalar can be overridden via environment variables; invalid values
//! log a warning and fall back to the default. Structural problems (zero
//! windows, dangling write endpoint) are rejected by [`NLWebConfig::validate`]
//! before the service accepts requests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::Mode;

// =============================================================================
// ENVIRONMENT VARIABLE NAME CONSTANTS
// =============================================================================

/// Default response mode: list | summarize | generate (default: list)
pub const NLWEB_DEFAULT_MODE: &str = "NLWEB_DEFAULT_MODE";
/// Whether /ask defaults to streaming responses (default: true)
pub const NLWEB_ENABLE_STREAMING: &str = "NLWEB_ENABLE_STREAMING";
/// Per-request deadline in seconds (default: 30)
pub const NLWEB_DEFAULT_TIMEOUT_SECS: &str = "NLWEB_DEFAULT_TIMEOUT_SECS";
/// Result pool size per query (default: 10)
pub const NLWEB_MAX_RESULTS_PER_QUERY: &str = "NLWEB_MAX_RESULTS_PER_QUERY";
/// Whether conversational queries are rewritten against prior turns (default: true)
pub const NLWEB_ENABLE_DECONTEXTUALIZATION: &str = "NLWEB_ENABLE_DECONTEXTUALIZATION";
/// Maximum accepted query length in characters (default: 2000)
pub const NLWEB_MAX_QUERY_LENGTH: &str = "NLWEB_MAX_QUERY_LENGTH";
/// Site scope applied when a request carries none
pub const NLWEB_DEFAULT_SITE: &str = "NLWEB_DEFAULT_SITE";
/// Whether keyword tool routing is active (default: true)
pub const NLWEB_TOOL_SELECTION_ENABLED: &str = "NLWEB_TOOL_SELECTION_ENABLED";

/// Rate limiter on/off switch (default: true)
pub const NLWEB_RATE_LIMIT_ENABLED: &str = "NLWEB_RATE_LIMIT_ENABLED";
/// Requests allowed per identifier per window (default: 100)
pub const NLWEB_RATE_LIMIT_REQUESTS: &str = "NLWEB_RATE_LIMIT_REQUESTS";
/// Window length in seconds (default: 60)
pub const NLWEB_RATE_LIMIT_WINDOW_SECS: &str = "NLWEB_RATE_LIMIT_WINDOW_SECS";
/// Whether remote IPs are used as limiter identifiers (default: true)
pub const NLWEB_RATE_LIMIT_IP_BASED: &str = "NLWEB_RATE_LIMIT_IP_BASED";
/// Whether a client header is preferred as the limiter identifier (default: false)
pub const NLWEB_RATE_LIMIT_CLIENT_BASED: &str = "NLWEB_RATE_LIMIT_CLIENT_BASED";
/// Header carrying the client identifier (default: x-client-id)
pub const NLWEB_RATE_LIMIT_CLIENT_HEADER: &str = "NLWEB_RATE_LIMIT_CLIENT_HEADER";
/// Bound on the number of tracked identifiers (default: 10000)
pub const NLWEB_RATE_LIMIT_MAX_IDENTIFIERS: &str = "NLWEB_RATE_LIMIT_MAX_IDENTIFIERS";

/// Multi-backend querying on/off switch (default: true)
pub const NLWEB_MULTI_BACKEND_ENABLED: &str = "NLWEB_MULTI_BACKEND_ENABLED";
/// Whether enabled backends are queried concurrently (default: true)
pub const NLWEB_PARALLEL_QUERYING: &str = "NLWEB_PARALLEL_QUERYING";
/// Whether merged results are deduplicated by URL (default: true)
pub const NLWEB_RESULT_DEDUPLICATION: &str = "NLWEB_RESULT_DEDUPLICATION";
/// Concurrency cap for parallel backend queries (default: 4)
pub const NLWEB_MAX_CONCURRENT_QUERIES: &str = "NLWEB_MAX_CONCURRENT_QUERIES";
/// Per-backend call timeout in seconds (default: 10)
pub const NLWEB_BACKEND_TIMEOUT_SECS: &str = "NLWEB_BACKEND_TIMEOUT_SECS";

/// Path to the tool definitions document (YAML)
pub const NLWEB_TOOL_DEFINITIONS_PATH: &str = "NLWEB_TOOL_DEFINITIONS_PATH";

// =============================================================================
// DEFAULT CONSTANTS
// =============================================================================

/// Default per-request deadline.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Default result pool size per query; each backend receives this as its cap
/// so the merged pool is at least this large when possible.
pub const DEFAULT_MAX_RESULTS_PER_QUERY: usize = 10;
/// Default maximum accepted query length, in characters.
pub const DEFAULT_MAX_QUERY_LENGTH: usize = 2000;
/// Default requests per identifier per rate-limit window.
pub const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 100;
/// Default rate-limit window length.
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
/// Default bound on tracked rate-limit identifiers. Evicting an identifier
/// forfeits whatever budget it had consumed in its current window.
pub const DEFAULT_RATE_LIMIT_MAX_IDENTIFIERS: usize = 10_000;
/// Default concurrency cap for parallel backend fan-out.
pub const DEFAULT_MAX_CONCURRENT_QUERIES: usize = 4;
/// Default per-backend call timeout.
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 10;
/// Default header consulted for client-based rate limiting.
pub const DEFAULT_CLIENT_ID_HEADER: &str = "x-client-id";

// =============================================================================
// ENVIRONMENT VARIABLE PARSING
// =============================================================================

/// Parse an env var, warning (rather than silently falling back) when a value
/// is set but unparseable.
pub fn parse_env_var_with_warning<T: std::str::FromStr>(var_name: &str, default: T) -> T {
    match std::env::var(var_name) {
        Ok(value) => match value.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!(
                    var = var_name,
                    value = %value,
                    "Invalid environment value, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_bool_env(var_name: &str, default: bool) -> bool {
    parse_env_var_with_warning(var_name, default)
}

// =============================================================================
// CONFIG TYPES
// =============================================================================

/// Rate limiter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Master switch; when off, every request is allowed
    pub enabled: bool,
    /// Requests allowed per identifier within one window
    pub requests_per_window: u32,
    /// Fixed window length in seconds
    pub window_secs: u64,
    /// Use the remote IP as the identifier
    pub enable_ip_based: bool,
    /// Prefer a client header over the remote IP
    pub enable_client_based: bool,
    /// Header consulted when client-based limiting is on
    pub client_id_header: String,
    /// Bound on the tracked-identifier map (LRU eviction beyond this)
    pub max_tracked_identifiers: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_window: DEFAULT_RATE_LIMIT_REQUESTS,
            window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
            enable_ip_based: true,
            enable_client_based: false,
            client_id_header: DEFAULT_CLIENT_ID_HEADER.to_string(),
            max_tracked_identifiers: DEFAULT_RATE_LIMIT_MAX_IDENTIFIERS,
        }
    }
}

/// Declarative record for one registered backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendEndpointConfig {
    /// Unique endpoint id
    pub id: String,
    /// Whether this endpoint participates in the read path
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Implementation tag (e.g. "qdrant", "mock")
    pub backend_type: String,
    /// Higher wins for serial dispatch order and merge tie-breaks
    #[serde(default)]
    pub priority: i32,
    /// Opaque implementation-specific properties
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

/// Multi-backend fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiBackendConfig {
    /// Master switch for multi-backend querying
    pub enabled: bool,
    /// Endpoint id designated as the data-ingestion sink (never read from)
    pub write_endpoint: Option<String>,
    /// Query enabled backends concurrently rather than serially
    pub enable_parallel_querying: bool,
    /// Deduplicate merged results by normalized URL
    pub enable_result_deduplication: bool,
    /// Concurrency cap for parallel dispatch
    pub max_concurrent_queries: usize,
    /// Per-backend call timeout in seconds
    pub backend_timeout_secs: u64,
    /// Declared endpoints
    pub endpoints: Vec<BackendEndpointConfig>,
}

impl Default for MultiBackendConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            write_endpoint: None,
            enable_parallel_querying: true,
            enable_result_deduplication: true,
            max_concurrent_queries: DEFAULT_MAX_CONCURRENT_QUERIES,
            backend_timeout_secs: DEFAULT_BACKEND_TIMEOUT_SECS,
            endpoints: Vec::new(),
        }
    }
}

/// Top-level immutable configuration for the query core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NLWebConfig {
    /// Mode applied when a request carries none
    pub default_mode: Mode,
    /// Whether /ask defaults to streaming
    pub enable_streaming: bool,
    /// Per-request deadline in seconds
    pub default_timeout_secs: u64,
    /// Result pool size per query
    pub max_results_per_query: usize,
    /// Rewrite conversational queries against prior turns
    pub enable_decontextualization: bool,
    /// Maximum accepted query length in characters
    pub max_query_length: usize,
    /// Site scope applied when a request carries none
    pub default_site: Option<String>,
    /// Keyword tool routing switch
    pub tool_selection_enabled: bool,
    /// Rate limiter settings
    pub rate_limiting: RateLimitConfig,
    /// Multi-backend fan-out settings
    pub multi_backend: MultiBackendConfig,
    /// Optional path to the tool definitions document
    pub tool_definitions_path: Option<String>,
}

impl Default for NLWebConfig {
    fn default() -> Self {
        Self {
            default_mode: Mode::List,
            enable_streaming: true,
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_results_per_query: DEFAULT_MAX_RESULTS_PER_QUERY,
            enable_decontextualization: true,
            max_query_length: DEFAULT_MAX_QUERY_LENGTH,
            default_site: None,
            tool_selection_enabled: true,
            rate_limiting: RateLimitConfig::default(),
            multi_backend: MultiBackendConfig::default(),
            tool_definitions_path: None,
        }
    }
}

impl NLWebConfig {
    /// Build a configuration from environment variables.
    ///
    /// Endpoint declarations have no env representation; they are added by the
    /// embedding application before backends are registered.
    #[must_use]
    pub fn from_env() -> Self {
        let default_mode = match std::env::var(NLWEB_DEFAULT_MODE) {
            Ok(value) => match value.parse::<Mode>() {
                Ok(mode) => mode,
                Err(_) => {
                    tracing::warn!(
                        var = NLWEB_DEFAULT_MODE,
                        value = %value,
                        "Invalid environment value, using default"
                    );
                    Mode::List
                }
            },
            Err(_) => Mode::List,
        };

        Self {
            default_mode,
            enable_streaming: parse_bool_env(NLWEB_ENABLE_STREAMING, true),
            default_timeout_secs: parse_env_var_with_warning(
                NLWEB_DEFAULT_TIMEOUT_SECS,
                DEFAULT_TIMEOUT_SECS,
            ),
            max_results_per_query: parse_env_var_with_warning(
                NLWEB_MAX_RESULTS_PER_QUERY,
                DEFAULT_MAX_RESULTS_PER_QUERY,
            ),
            enable_decontextualization: parse_bool_env(NLWEB_ENABLE_DECONTEXTUALIZATION, true),
            max_query_length: parse_env_var_with_warning(
                NLWEB_MAX_QUERY_LENGTH,
                DEFAULT_MAX_QUERY_LENGTH,
            ),
            default_site: std::env::var(NLWEB_DEFAULT_SITE).ok(),
            tool_selection_enabled: parse_bool_env(NLWEB_TOOL_SELECTION_ENABLED, true),
            rate_limiting: RateLimitConfig {
                enabled: parse_bool_env(NLWEB_RATE_LIMIT_ENABLED, true),
                requests_per_window: parse_env_var_with_warning(
                    NLWEB_RATE_LIMIT_REQUESTS,
                    DEFAULT_RATE_LIMIT_REQUESTS,
                ),
                window_secs: parse_env_var_with_warning(
                    NLWEB_RATE_LIMIT_WINDOW_SECS,
                    DEFAULT_RATE_LIMIT_WINDOW_SECS,
                ),
                enable_ip_based: parse_bool_env(NLWEB_RATE_LIMIT_IP_BASED, true),
                enable_client_based: parse_bool_env(NLWEB_RATE_LIMIT_CLIENT_BASED, false),
                client_id_header: std::env::var(NLWEB_RATE_LIMIT_CLIENT_HEADER)
                    .unwrap_or_else(|_| DEFAULT_CLIENT_ID_HEADER.to_string()),
                max_tracked_identifiers: parse_env_var_with_warning(
                    NLWEB_RATE_LIMIT_MAX_IDENTIFIERS,
                    DEFAULT_RATE_LIMIT_MAX_IDENTIFIERS,
                ),
            },
            multi_backend: MultiBackendConfig {
                enabled: parse_bool_env(NLWEB_MULTI_BACKEND_ENABLED, true),
                write_endpoint: None,
                enable_parallel_querying: parse_bool_env(NLWEB_PARALLEL_QUERYING, true),
                enable_result_deduplication: parse_bool_env(NLWEB_RESULT_DEDUPLICATION, true),
                max_concurrent_queries: parse_env_var_with_warning(
                    NLWEB_MAX_CONCURRENT_QUERIES,
                    DEFAULT_MAX_CONCURRENT_QUERIES,
                ),
                backend_timeout_secs: parse_env_var_with_warning(
                    NLWEB_BACKEND_TIMEOUT_SECS,
                    DEFAULT_BACKEND_TIMEOUT_SECS,
                ),
                endpoints: Vec::new(),
            },
            tool_definitions_path: std::env::var(NLWEB_TOOL_DEFINITIONS_PATH).ok(),
        }
    }

    /// Reject structurally invalid configurations before first use.
    pub fn validate(&self) -> Result<()> {
        if self.max_query_length == 0 {
            return Err(Error::Config("max_query_length must be positive".into()));
        }
        if self.max_results_per_query == 0 {
            return Err(Error::Config(
                "max_results_per_query must be positive".into(),
            ));
        }
        if self.default_timeout_secs == 0 {
            return Err(Error::Config("default_timeout_secs must be positive".into()));
        }

        let rl = &self.rate_limiting;
        if rl.enabled {
            if rl.requests_per_window == 0 {
                return Err(Error::Config(
                    "rate_limiting.requests_per_window must be positive".into(),
                ));
            }
            if rl.window_secs == 0 {
                return Err(Error::Config(
                    "rate_limiting.window_secs must be positive".into(),
                ));
            }
            if rl.max_tracked_identifiers == 0 {
                return Err(Error::Config(
                    "rate_limiting.max_tracked_identifiers must be positive".into(),
                ));
            }
        }

        let mb = &self.multi_backend;
        if mb.max_concurrent_queries == 0 {
            return Err(Error::Config(
                "multi_backend.max_concurrent_queries must be positive".into(),
            ));
        }
        if mb.backend_timeout_secs == 0 {
            return Err(Error::Config(
                "multi_backend.backend_timeout_secs must be positive".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for endpoint in &mb.endpoints {
            if endpoint.id.trim().is_empty() {
                return Err(Error::Config("endpoint id must be non-empty".into()));
            }
            if !seen.insert(endpoint.id.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate endpoint id: {}",
                    endpoint.id
                )));
            }
        }
        if let Some(write) = &mb.write_endpoint {
            if !mb.endpoints.iter().any(|e| &e.id == write) {
                return Err(Error::Config(format!(
                    "write_endpoint '{write}' does not match any declared endpoint"
                )));
            }
        }

        Ok(())
    }
}
