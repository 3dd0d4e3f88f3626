//! Mode-specific response shaping: ranked lists, summaries, generated answers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::chat::{ChatClient, ChatMessage};
use crate::config::NLWebConfig;
use crate::models::{Mode, NLWebResult};

const SUMMARIZE_SYSTEM_PROMPT: &str = "You summarize search results. Given a query and numbered result \
     snippets, write a concise summary that answers the query using only \
     the snippets. Do not invent facts.";

const GENERATE_SYSTEM_PROMPT: &str = "You answer questions from retrieved context. Given a question and \
     numbered result snippets, write a direct answer grounded in the \
     snippets. If the snippets do not contain the answer, say so.";

const COMPARE_SYSTEM_PROMPT: &str = "You compare two subjects from search results. Write a side-by-side \
     summary with one section per subject, using the section headings you \
     are given, then a short verdict on the key differences.";

const GROUPED_SYSTEM_PROMPT: &str = "You assemble a recommendation set from search results. For each \
     labeled group, pick the strongest options and explain briefly how the \
     pieces fit together.";

/// The shaped output of one tool execution, before response assembly.
#[derive(Debug, Clone)]
pub struct GeneratedResponse {
    /// Mode actually delivered (degrades to List when the chat client fails)
    pub mode: Mode,
    /// Ranked hits
    pub results: Vec<NLWebResult>,
    /// Summary or generated answer; `None` in List mode
    pub summary: Option<String>,
    /// Non-fatal degradation notices
    pub warnings: Vec<String>,
}

/// Shapes merged backend results for the requested mode.
pub struct ResultGenerator {
    config: Arc<NLWebConfig>,
    chat: Option<Arc<dyn ChatClient>>,
}

impl ResultGenerator {
    /// Build a generator; without a chat client every mode degrades to List.
    #[must_use]
    pub fn new(config: Arc<NLWebConfig>, chat: Option<Arc<dyn ChatClient>>) -> Self {
        Self { config, chat }
    }

    /// Shape `results` for `mode`.
    pub async fn generate(
        &self,
        query: &str,
        mode: Mode,
        mut results: Vec<NLWebResult>,
        cancel: &CancellationToken,
    ) -> GeneratedResponse {
        results.truncate(self.config.max_results_per_query);
        match mode {
            Mode::List => GeneratedResponse {
                mode: Mode::List,
                results,
                summary: None,
                warnings: Vec::new(),
            },
            Mode::Summarize => {
                let prompt = format!(
                    "Query: {query}\n\nResults:\n{}",
                    format_snippets(&results)
                );
                self.complete_or_degrade(mode, results, SUMMARIZE_SYSTEM_PROMPT, prompt, cancel)
                    .await
            }
            Mode::Generate => {
                let prompt = format!(
                    "Question: {query}\n\nRetrieved context:\n{}",
                    format_snippets(&results)
                );
                self.complete_or_degrade(mode, results, GENERATE_SYSTEM_PROMPT, prompt, cancel)
                    .await
            }
        }
    }

    /// Side-by-side comparison of two subjects, delivered as Summarize.
    pub async fn generate_comparison(
        &self,
        subject_a: &str,
        results_a: &[NLWebResult],
        subject_b: &str,
        results_b: &[NLWebResult],
        cancel: &CancellationToken,
    ) -> GeneratedResponse {
        let prompt = format!(
            "Section \"{subject_a}\":\n{}\n\nSection \"{subject_b}\":\n{}",
            format_snippets(results_a),
            format_snippets(results_b),
        );

        // Both lists stay in the response for citation, score-descending
        let mut combined: Vec<NLWebResult> = results_a.iter().chain(results_b).cloned().collect();
        combined.sort_by(|a, b| b.score.total_cmp(&a.score));
        combined.truncate(self.config.max_results_per_query);

        self.complete_or_degrade(
            Mode::Summarize,
            combined,
            COMPARE_SYSTEM_PROMPT,
            prompt,
            cancel,
        )
        .await
    }

    /// Grouped recommendation summary over labeled result groups.
    pub async fn generate_grouped(
        &self,
        query: &str,
        groups: &[(String, Vec<NLWebResult>)],
        merged: Vec<NLWebResult>,
        cancel: &CancellationToken,
    ) -> GeneratedResponse {
        let mut prompt = format!("Request: {query}\n");
        for (label, results) in groups {
            prompt.push_str(&format!("\nGroup \"{label}\":\n{}", format_snippets(results)));
        }
        self.complete_or_degrade(Mode::Summarize, merged, GROUPED_SYSTEM_PROMPT, prompt, cancel)
            .await
    }

    async fn complete_or_degrade(
        &self,
        mode: Mode,
        results: Vec<NLWebResult>,
        system_prompt: &str,
        user_prompt: String,
        cancel: &CancellationToken,
    ) -> GeneratedResponse {
        let completion = match &self.chat {
            Some(chat) => {
                let messages = [
                    ChatMessage::system(system_prompt),
                    ChatMessage::user(user_prompt),
                ];
                chat.complete(&messages, cancel).await
            }
            None => Err(crate::error::Error::ChatClientUnavailable(
                "no chat client configured".into(),
            )),
        };

        match completion {
            Ok(summary) => GeneratedResponse {
                mode,
                results,
                summary: Some(summary),
                warnings: Vec::new(),
            },
            Err(err) => {
                // Chat failure never fails the request: degrade to List
                tracing::warn!(error = %err, requested_mode = %mode, "Chat client failed, degrading to list");
                GeneratedResponse {
                    mode: Mode::List,
                    results,
                    summary: None,
                    warnings: vec![format!(
                        "chat client unavailable; degraded from {mode} to list"
                    )],
                }
            }
        }
    }
}

/// Number snippets so summaries can reference them textually.
fn format_snippets(results: &[NLWebResult]) -> String {
    if results.is_empty() {
        return "(no results)".to_string();
    }
    results
        .iter()
        .enumerate()
        .map(|(index, result)| {
            format!(
                "{}. {} ({})\n   {}",
                index + 1,
                result.name,
                result.url,
                result.description
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use async_trait::async_trait;

    struct EchoChat;

    #[async_trait]
    impl ChatClient for EchoChat {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _cancel: &CancellationToken,
        ) -> Result<String> {
            Ok(format!("echo:{}", messages.len()))
        }
    }

    struct DownChat;

    #[async_trait]
    impl ChatClient for DownChat {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _cancel: &CancellationToken,
        ) -> Result<String> {
            Err(Error::ChatClientUnavailable("down".into()))
        }
    }

    fn hits(count: usize) -> Vec<NLWebResult> {
        (0..count)
            .map(|index| {
                NLWebResult::new(
                    format!("hit {index}"),
                    format!("https://example.com/{index}"),
                    1.0 - index as f64 * 0.05,
                )
                .with_description("snippet")
            })
            .collect()
    }

    fn generator(chat: Option<Arc<dyn ChatClient>>) -> ResultGenerator {
        ResultGenerator::new(Arc::new(NLWebConfig::default()), chat)
    }

    #[tokio::test]
    async fn test_list_mode_has_no_summary() {
        let output = generator(Some(Arc::new(EchoChat)))
            .generate("q", Mode::List, hits(3), &CancellationToken::new())
            .await;
        assert_eq!(output.mode, Mode::List);
        assert!(output.summary.is_none());
        assert_eq!(output.results.len(), 3);
        assert!(output.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_list_truncates_to_configured_k() {
        let output = generator(None)
            .generate("q", Mode::List, hits(25), &CancellationToken::new())
            .await;
        assert_eq!(
            output.results.len(),
            NLWebConfig::default().max_results_per_query
        );
    }

    #[tokio::test]
    async fn test_summarize_populates_summary() {
        let output = generator(Some(Arc::new(EchoChat)))
            .generate("q", Mode::Summarize, hits(2), &CancellationToken::new())
            .await;
        assert_eq!(output.mode, Mode::Summarize);
        assert_eq!(output.summary.as_deref(), Some("echo:2"));
        assert_eq!(output.results.len(), 2);
    }

    #[tokio::test]
    async fn test_generate_populates_summary() {
        let output = generator(Some(Arc::new(EchoChat)))
            .generate("q", Mode::Generate, hits(2), &CancellationToken::new())
            .await;
        assert_eq!(output.mode, Mode::Generate);
        assert!(output.summary.is_some());
    }

    #[tokio::test]
    async fn test_chat_failure_degrades_to_list() {
        let output = generator(Some(Arc::new(DownChat)))
            .generate("q", Mode::Summarize, hits(2), &CancellationToken::new())
            .await;
        assert_eq!(output.mode, Mode::List);
        assert!(output.summary.is_none());
        assert_eq!(output.results.len(), 2);
        assert_eq!(output.warnings.len(), 1);
        assert!(output.warnings[0].contains("degraded"));
    }

    #[tokio::test]
    async fn test_missing_chat_client_degrades() {
        let output = generator(None)
            .generate("q", Mode::Generate, hits(1), &CancellationToken::new())
            .await;
        assert_eq!(output.mode, Mode::List);
        assert_eq!(output.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_comparison_combines_and_ranks_citations() {
        let a = vec![NLWebResult::new("a1", "https://a/1", 0.4)];
        let b = vec![NLWebResult::new("b1", "https://b/1", 0.9)];
        let output = generator(Some(Arc::new(EchoChat)))
            .generate_comparison(".NET Core", &a, ".NET Framework", &b, &CancellationToken::new())
            .await;
        assert_eq!(output.mode, Mode::Summarize);
        assert!(output.summary.is_some());
        assert_eq!(output.results[0].url, "https://b/1");
        assert_eq!(output.results.len(), 2);
    }

    #[tokio::test]
    async fn test_grouped_summary() {
        let groups = vec![
            ("main course".to_string(), hits(2)),
            ("dessert".to_string(), hits(1)),
        ];
        let output = generator(Some(Arc::new(EchoChat)))
            .generate_grouped("dinner plan", &groups, hits(3), &CancellationToken::new())
            .await;
        assert_eq!(output.mode, Mode::Summarize);
        assert!(output.summary.is_some());
        assert_eq!(output.results.len(), 3);
    }

    #[test]
    fn test_snippet_formatting() {
        let formatted = format_snippets(&hits(2));
        assert!(formatted.starts_with("1. hit 0 (https://example.com/0)"));
        assert!(formatted.contains("2. hit 1"));
        assert_eq!(format_snippets(&[]), "(no results)");
    }
}
