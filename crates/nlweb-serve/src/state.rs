//! State shared across handlers

use std::sync::Arc;

use nlweb::rate_limit::RateLimiter;
use nlweb::{McpAdapter, NLWebConfig, QueryService};

/// State shared across handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    /// The query pipeline
    pub service: Arc<QueryService>,
    /// MCP adapter over the same pipeline
    pub mcp: Arc<McpAdapter>,
    /// Per-identifier request limiter
    pub limiter: Arc<RateLimiter>,
    /// Immutable service configuration
    pub config: Arc<NLWebConfig>,
}

impl AppState {
    /// Build the shared state around a composed service.
    #[must_use]
    pub fn new(service: Arc<QueryService>) -> Self {
        let config = Arc::clone(service.config());
        Self {
            mcp: Arc::new(McpAdapter::new(Arc::clone(&service))),
            limiter: Arc::new(RateLimiter::new(&config.rate_limiting)),
            service,
            config,
        }
    }
}
