//! Request normalization and decontextualization.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::chat::{ChatClient, ChatMessage};
use crate::config::NLWebConfig;
use crate::error::Result;
use crate::models::{Mode, NLWebRequest};

/// System prompt for the decontextualization call. The model sees the prior
/// queries in order and must answer with the rewritten query alone.
const DECONTEXTUALIZE_SYSTEM_PROMPT: &str = "You rewrite conversational search queries into standalone queries. \
     Given the previous queries of a conversation and the latest query, \
     produce a single self-contained query that preserves the latest \
     query's intent. Respond with the rewritten query only, no quotes, \
     no explanation.";

/// A validated request with its standalone query resolved.
#[derive(Debug, Clone)]
pub struct ProcessedQuery {
    /// Request id, generated when the request carried none
    pub query_id: String,
    /// The raw query as received
    pub query: String,
    /// The standalone rewrite used for retrieval
    pub decontextualized_query: String,
    /// Effective response mode
    pub mode: Mode,
    /// Effective site scope
    pub site: Option<String>,
    /// True when the caller supplied `decontextualized_query` at ingress;
    /// tool selection treats that as the caller having chosen
    pub decontextualized_on_input: bool,
    /// Non-fatal notices accumulated so far
    pub warnings: Vec<String>,
}

/// Normalizes incoming requests and resolves the standalone query.
pub struct QueryProcessor {
    config: Arc<NLWebConfig>,
    chat: Option<Arc<dyn ChatClient>>,
}

impl QueryProcessor {
    /// Build a processor; without a chat client decontextualization is a
    /// pass-through.
    #[must_use]
    pub fn new(config: Arc<NLWebConfig>, chat: Option<Arc<dyn ChatClient>>) -> Self {
        Self { config, chat }
    }

    /// Validate the request and resolve its standalone query.
    ///
    /// The caller-supplied `decontextualized_query` passes through verbatim.
    /// A chat-client failure is non-fatal: the raw query is used and a
    /// warning recorded.
    pub async fn process(
        &self,
        request: &NLWebRequest,
        cancel: &CancellationToken,
    ) -> Result<ProcessedQuery> {
        request.validate(&self.config)?;

        let query_id = request
            .query_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut warnings = Vec::new();
        let decontextualized_on_input = request.decontextualized_query.is_some();
        let decontextualized_query = if let Some(supplied) = &request.decontextualized_query {
            supplied.clone()
        } else {
            self.decontextualize(request, cancel, &mut warnings).await
        };

        Ok(ProcessedQuery {
            query_id,
            query: request.query.clone(),
            decontextualized_query,
            mode: request.effective_mode(&self.config),
            site: request.effective_site(&self.config).map(str::to_string),
            decontextualized_on_input,
            warnings,
        })
    }

    async fn decontextualize(
        &self,
        request: &NLWebRequest,
        cancel: &CancellationToken,
        warnings: &mut Vec<String>,
    ) -> String {
        let prev = request.prev_queries();
        if prev.is_empty() || !self.config.enable_decontextualization {
            return request.query.clone();
        }
        let Some(chat) = &self.chat else {
            return request.query.clone();
        };

        let mut prompt = String::from("Previous queries:\n");
        for (index, prior) in prev.iter().enumerate() {
            prompt.push_str(&format!("{}. {prior}\n", index + 1));
        }
        prompt.push_str(&format!("\nLatest query: {}", request.query));

        let messages = [
            ChatMessage::system(DECONTEXTUALIZE_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];
        match chat.complete(&messages, cancel).await {
            Ok(rewritten) => {
                let rewritten = rewritten.trim();
                if rewritten.is_empty() {
                    warnings.push("decontextualization returned an empty rewrite; using the raw query".to_string());
                    request.query.clone()
                } else {
                    tracing::debug!(
                        original = %request.query,
                        rewritten = %rewritten,
                        "Decontextualized query"
                    );
                    rewritten.to_string()
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "Decontextualization failed, using the raw query");
                warnings
                    .push("decontextualization unavailable; using the raw query".to_string());
                request.query.clone()
            }
        }
    }
}
