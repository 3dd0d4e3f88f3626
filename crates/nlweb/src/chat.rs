//! Chat-model seam consumed by decontextualization and result generation.
//!
//! Concrete clients live outside the core; the pipeline only needs a single
//! `complete` operation that turns a message list into one reply string.
//! Clients are shared across requests and must be safe for concurrent use.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Behavioral instructions for the model
    System,
    /// End-user content
    User,
    /// Prior model output
    Assistant,
}

/// One message in a chat exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who is speaking
    pub role: ChatRole,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// A user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// An assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A chat-completion client.
///
/// Implementations must honor `cancel` promptly; a cancelled call returns
/// [`crate::Error::Cancelled`].
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Produce a single completion for `messages`.
    async fn complete(&self, messages: &[ChatMessage], cancel: &CancellationToken)
        -> Result<String>;

    /// Implementation name, for logs.
    fn name(&self) -> &str {
        "chat"
    }
}
