//! Pluggable data backends and the fan-out manager that queries them.
//!
//! A backend is anything that can turn a query string into scored
//! [`NLWebResult`]s: a vector store, a web search API, a mock catalog. The
//! core only consumes the [`DataBackend`] contract; concrete implementations
//! are registered by the embedding application at startup.

mod manager;

pub use manager::BackendManager;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::BackendEndpointConfig;
use crate::error::{Error, Result};
use crate::models::NLWebResult;

/// A pluggable source of scored results.
///
/// Implementations are shared across requests and must be safe for concurrent
/// use. `search` must honor `cancel` promptly and may return
/// [`Error::NotImplemented`] to mark itself enabled-but-unsearchable.
#[async_trait]
pub trait DataBackend: Send + Sync {
    /// Retrieve up to `max_results` hits for `query`, optionally scoped to `site`.
    async fn search(
        &self,
        query: &str,
        site: Option<&str>,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<NLWebResult>>;

    /// Implementation name, for logs.
    fn name(&self) -> &str {
        "backend"
    }

    /// Implementation tag (e.g. "qdrant", "mock").
    fn backend_type(&self) -> &str {
        "unknown"
    }
}

/// Registry record for one backend instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendEndpoint {
    /// Unique endpoint id
    pub id: String,
    /// Whether this endpoint participates in the read path
    pub enabled: bool,
    /// Implementation tag
    pub backend_type: String,
    /// Higher wins for dispatch order and merge tie-breaks
    pub priority: i32,
    /// Opaque implementation-specific properties
    pub properties: HashMap<String, String>,
}

impl From<BackendEndpointConfig> for BackendEndpoint {
    fn from(config: BackendEndpointConfig) -> Self {
        Self {
            id: config.id,
            enabled: config.enabled,
            backend_type: config.backend_type,
            priority: config.priority,
            properties: config.properties,
        }
    }
}

pub(crate) struct RegisteredBackend {
    pub(crate) endpoint: BackendEndpoint,
    pub(crate) backend: Arc<dyn DataBackend>,
}

/// Holds named backend instances and flags one as the write endpoint.
///
/// Registration happens at startup; the registry is immutable afterwards and
/// owned by the [`BackendManager`] for the process lifetime.
#[derive(Default)]
pub struct BackendRegistry {
    entries: Vec<RegisteredBackend>,
    write_endpoint: Option<String>,
}

impl BackendRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under its endpoint record.
    pub fn register(
        &mut self,
        endpoint: impl Into<BackendEndpoint>,
        backend: Arc<dyn DataBackend>,
    ) -> Result<()> {
        let endpoint = endpoint.into();
        if endpoint.id.trim().is_empty() {
            return Err(Error::Config("endpoint id must be non-empty".into()));
        }
        if self.entries.iter().any(|e| e.endpoint.id == endpoint.id) {
            return Err(Error::Config(format!(
                "duplicate endpoint id: {}",
                endpoint.id
            )));
        }
        tracing::debug!(
            endpoint = %endpoint.id,
            backend_type = %endpoint.backend_type,
            enabled = endpoint.enabled,
            priority = endpoint.priority,
            "Registered backend"
        );
        self.entries.push(RegisteredBackend { endpoint, backend });
        Ok(())
    }

    /// Designate the data-ingestion sink. The endpoint must already be registered.
    pub fn set_write_endpoint(&mut self, id: impl Into<String>) -> Result<()> {
        let id = id.into();
        if !self.entries.iter().any(|e| e.endpoint.id == id) {
            return Err(Error::Config(format!(
                "write_endpoint '{id}' does not match any registered endpoint"
            )));
        }
        self.write_endpoint = Some(id);
        Ok(())
    }

    /// Look up an endpoint record by id.
    #[must_use]
    pub fn endpoint(&self, id: &str) -> Option<&BackendEndpoint> {
        self.entries
            .iter()
            .find(|e| e.endpoint.id == id)
            .map(|e| &e.endpoint)
    }

    /// The designated ingestion sink, if any. Never used on the read path.
    #[must_use]
    pub fn write_endpoint(&self) -> Option<&BackendEndpoint> {
        self.write_endpoint
            .as_deref()
            .and_then(|id| self.endpoint(id))
    }

    /// Enabled backends, priority-descending (registration order breaks ties).
    pub(crate) fn enabled(&self) -> Vec<&RegisteredBackend> {
        let mut enabled: Vec<&RegisteredBackend> = self
            .entries
            .iter()
            .filter(|e| e.endpoint.enabled)
            .collect();
        enabled.sort_by_key(|e| std::cmp::Reverse(e.endpoint.priority));
        enabled
    }

    /// Number of registered endpoints, enabled or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of endpoints participating in the read path.
    #[must_use]
    pub fn enabled_count(&self) -> usize {
        self.entries.iter().filter(|e| e.endpoint.enabled).count()
    }

    /// Whether the registry holds no endpoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullBackend;

    #[async_trait]
    impl DataBackend for NullBackend {
        async fn search(
            &self,
            _query: &str,
            _site: Option<&str>,
            _max_results: usize,
            _cancel: &CancellationToken,
        ) -> Result<Vec<NLWebResult>> {
            Ok(Vec::new())
        }
    }

    fn endpoint(id: &str, enabled: bool, priority: i32) -> BackendEndpoint {
        BackendEndpoint {
            id: id.to_string(),
            enabled,
            backend_type: "null".to_string(),
            priority,
            properties: HashMap::new(),
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = BackendRegistry::new();
        registry
            .register(endpoint("a", true, 0), Arc::new(NullBackend))
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.endpoint("a").is_some());
        assert!(registry.endpoint("b").is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut registry = BackendRegistry::new();
        registry
            .register(endpoint("a", true, 0), Arc::new(NullBackend))
            .unwrap();
        let err = registry
            .register(endpoint("a", false, 1), Arc::new(NullBackend))
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_empty_id_rejected() {
        let mut registry = BackendRegistry::new();
        let err = registry
            .register(endpoint("  ", true, 0), Arc::new(NullBackend))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_enabled_sorted_by_priority() {
        let mut registry = BackendRegistry::new();
        registry
            .register(endpoint("low", true, 1), Arc::new(NullBackend))
            .unwrap();
        registry
            .register(endpoint("off", false, 100), Arc::new(NullBackend))
            .unwrap();
        registry
            .register(endpoint("high", true, 10), Arc::new(NullBackend))
            .unwrap();

        let ids: Vec<&str> = registry
            .enabled()
            .iter()
            .map(|e| e.endpoint.id.as_str())
            .collect();
        assert_eq!(ids, vec!["high", "low"]);
    }

    #[test]
    fn test_write_endpoint_requires_registration() {
        let mut registry = BackendRegistry::new();
        assert!(registry.set_write_endpoint("missing").is_err());

        registry
            .register(endpoint("sink", false, 0), Arc::new(NullBackend))
            .unwrap();
        registry.set_write_endpoint("sink").unwrap();
        assert_eq!(registry.write_endpoint().map(|e| e.id.as_str()), Some("sink"));
    }

    #[test]
    fn test_endpoint_from_config() {
        let config = BackendEndpointConfig {
            id: "primary".into(),
            enabled: true,
            backend_type: "qdrant".into(),
            priority: 5,
            properties: HashMap::from([("url".to_string(), "http://localhost".to_string())]),
        };
        let endpoint: BackendEndpoint = config.into();
        assert_eq!(endpoint.id, "primary");
        assert_eq!(endpoint.priority, 5);
        assert_eq!(endpoint.properties["url"], "http://localhost");
    }
}
