// Allow unwrap in testing utilities - test code should panic on errors
#![allow(clippy::unwrap_used)]

//! # NLWeb Testing Utilities
//!
//! Deterministic mocks for exercising the query pipeline without real
//! backends or chat models:
//!
//! - **MockBackend**: scripted results, failures, delays and call recording
//! - **MockChatClient**: scripted completions or failure
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use nlweb_test_utils::{MockBackend, MockChatClient};
//!
//! let backend = MockBackend::returning(vec![hit]);
//! let recorder = backend.recorder();
//! // ... run queries ...
//! assert_eq!(recorder.queries(), vec!["millennium falcon"]);
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use nlweb::chat::{ChatClient, ChatMessage};
use nlweb::{DataBackend, Error, NLWebResult, Result};

type BackendHandler = dyn Fn(&str) -> Result<Vec<NLWebResult>> + Send + Sync;

/// Shared view of the queries a [`MockBackend`] has served.
#[derive(Clone, Default)]
pub struct QueryRecorder {
    queries: Arc<Mutex<Vec<String>>>,
}

impl QueryRecorder {
    /// Queries observed so far, in call order.
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    /// Number of calls observed so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.queries.lock().len()
    }

    fn record(&self, query: &str) {
        self.queries.lock().push(query.to_string());
    }
}

/// A scripted [`DataBackend`].
pub struct MockBackend {
    handler: Box<BackendHandler>,
    delay: Option<Duration>,
    recorder: QueryRecorder,
}

impl MockBackend {
    /// A backend that returns the same results for every query.
    #[must_use]
    pub fn returning(results: Vec<NLWebResult>) -> Self {
        Self::with_handler(move |_| Ok(results.clone()))
    }

    /// A backend that fails every query.
    #[must_use]
    pub fn failing() -> Self {
        Self::with_handler(|_| Err(Error::Internal("mock backend failure".into())))
    }

    /// A backend that reports search as not implemented.
    #[must_use]
    pub fn unsearchable() -> Self {
        Self::with_handler(|_| Err(Error::NotImplemented("search".into())))
    }

    /// A backend whose behavior depends on the query.
    pub fn with_handler(
        handler: impl Fn(&str) -> Result<Vec<NLWebResult>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            delay: None,
            recorder: QueryRecorder::default(),
        }
    }

    /// Sleep before answering, to exercise timeouts and cancellation.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// A handle for asserting which queries reached this backend.
    #[must_use]
    pub fn recorder(&self) -> QueryRecorder {
        self.recorder.clone()
    }
}

#[async_trait]
impl DataBackend for MockBackend {
    async fn search(
        &self,
        query: &str,
        _site: Option<&str>,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<NLWebResult>> {
        self.recorder.record(query);
        if let Some(delay) = self.delay {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => return Err(Error::Cancelled),
            }
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut results = (self.handler)(query)?;
        results.truncate(max_results);
        Ok(results)
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn backend_type(&self) -> &str {
        "mock"
    }
}

/// A scripted [`ChatClient`].
pub struct MockChatClient {
    reply: Option<String>,
    calls: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl MockChatClient {
    /// A client that answers every completion with `reply`.
    #[must_use]
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A client that fails every completion.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Message lists received so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.calls.lock().push(messages.to_vec());
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => Err(Error::ChatClientUnavailable("mock chat failure".into())),
        }
    }

    fn name(&self) -> &str {
        "mock-chat"
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{MockBackend, MockChatClient, QueryRecorder};
}
