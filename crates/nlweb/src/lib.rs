//! NLWeb query core - natural-language queries over pluggable data backends.
//!
//! The core accepts a natural-language request, optionally rewrites it into a
//! standalone query using the conversation's prior turns, routes it through a
//! selectable tool (search, compare, details, ensemble), fans retrieval out
//! across the enabled backends, and shapes the merged results for the
//! requested mode: a ranked list, a summary, or a generated answer. The same
//! pipeline backs the Model Context Protocol adapter.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use nlweb::{BackendManager, BackendRegistry, NLWebConfig, NLWebRequest, QueryService};
//!
//! let config = Arc::new(NLWebConfig::from_env());
//! let mut registry = BackendRegistry::new();
//! registry.register(my_endpoint, Arc::new(my_backend))?;
//!
//! let manager = BackendManager::new(registry, config.multi_backend.clone());
//! let service = Arc::new(QueryService::new(config, manager, Some(chat_client))?);
//!
//! let response = service
//!     .process(&NLWebRequest::new("millennium falcon"), &cancel)
//!     .await?;
//! ```
//!
//! # Architecture
//!
//! Leaves-first: the rate limiter and backend registry know nothing of the
//! pipeline; the [`QueryService`] façade owns every stage and is the only
//! composition point. No stage holds a reference back to the service;
//! cancellation travels as a request-scoped token instead.

pub mod backends;
pub mod chat;
pub mod config;
pub mod error;
pub mod mcp;
pub mod models;
pub mod query;
pub mod rate_limit;
pub mod tools;

// Re-export main API
pub use backends::{BackendEndpoint, BackendManager, BackendRegistry, DataBackend};
pub use chat::{ChatClient, ChatMessage, ChatRole};
pub use config::{MultiBackendConfig, NLWebConfig, RateLimitConfig};
pub use error::{Error, Result};
pub use mcp::McpAdapter;
pub use models::{Mode, NLWebRequest, NLWebResponse, NLWebResult, StreamFrame};
pub use query::{QueryService, ToolType};
pub use rate_limit::{RateLimitStatus, RateLimiter};
pub use tools::{ToolCatalog, ToolDefinition};
