//! Tool handlers: one retrieval/generation strategy per tool type.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::generator::{GeneratedResponse, ResultGenerator};
use super::processor::ProcessedQuery;
use super::tool_selection::ToolType;
use crate::backends::BackendManager;
use crate::config::NLWebConfig;
use crate::error::{Error, Result};
use crate::models::{Mode, NLWebResult};
use crate::tools::ToolCatalog;

/// Everything a handler needs for one execution.
pub struct HandlerContext<'a> {
    /// The normalized request
    pub processed: &'a ProcessedQuery,
    /// Shared retrieval layer
    pub backends: &'a BackendManager,
    /// Shared response shaper
    pub generator: &'a ResultGenerator,
    /// Immutable service configuration
    pub config: &'a NLWebConfig,
}

/// One tool strategy.
///
/// Handlers are stateless beyond their definition-supplied priority and are
/// shared across requests.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// The tool this handler implements.
    fn tool_type(&self) -> ToolType;

    /// Whether this handler can serve the query.
    fn can_handle(&self, _processed: &ProcessedQuery) -> bool {
        true
    }

    /// Selection weight among handlers that can serve the query.
    fn priority(&self, _processed: &ProcessedQuery) -> i32;

    /// Run retrieval and shaping for the query.
    async fn execute(
        &self,
        ctx: HandlerContext<'_>,
        cancel: &CancellationToken,
    ) -> Result<GeneratedResponse>;
}

// ---------------------------------------------------------------------------
// search
// ---------------------------------------------------------------------------

/// Plain retrieval shaped by the request mode. Also the fallback for every
/// other handler.
pub struct SearchHandler {
    priority: i32,
}

impl SearchHandler {
    /// Build with a definition-supplied priority.
    #[must_use]
    pub fn new(priority: i32) -> Self {
        Self { priority }
    }
}

#[async_trait]
impl ToolHandler for SearchHandler {
    fn tool_type(&self) -> ToolType {
        ToolType::Search
    }

    fn priority(&self, _processed: &ProcessedQuery) -> i32 {
        self.priority
    }

    async fn execute(
        &self,
        ctx: HandlerContext<'_>,
        cancel: &CancellationToken,
    ) -> Result<GeneratedResponse> {
        let results = ctx
            .backends
            .query(
                &ctx.processed.decontextualized_query,
                ctx.processed.site.as_deref(),
                ctx.config.max_results_per_query,
                cancel,
            )
            .await?;
        Ok(ctx
            .generator
            .generate(
                &ctx.processed.decontextualized_query,
                ctx.processed.mode,
                results,
                cancel,
            )
            .await)
    }
}

// ---------------------------------------------------------------------------
// details
// ---------------------------------------------------------------------------

/// Focused lookup: reframes the query toward specifics, retrieves a smaller
/// pool, and always delivers a summarizing mode.
pub struct DetailsHandler {
    priority: i32,
}

impl DetailsHandler {
    /// Build with a definition-supplied priority.
    #[must_use]
    pub fn new(priority: i32) -> Self {
        Self { priority }
    }
}

#[async_trait]
impl ToolHandler for DetailsHandler {
    fn tool_type(&self) -> ToolType {
        ToolType::Details
    }

    fn priority(&self, _processed: &ProcessedQuery) -> i32 {
        self.priority
    }

    async fn execute(
        &self,
        ctx: HandlerContext<'_>,
        cancel: &CancellationToken,
    ) -> Result<GeneratedResponse> {
        let framed = format!(
            "{} detailed specifications",
            ctx.processed.decontextualized_query
        );
        let max_results = (ctx.config.max_results_per_query / 2).max(1);
        let results = ctx
            .backends
            .query(&framed, ctx.processed.site.as_deref(), max_results, cancel)
            .await?;

        // Details always summarizes; a generate-configured deployment gets
        // the generated form instead
        let mode = if ctx.config.default_mode == Mode::Generate {
            Mode::Generate
        } else {
            Mode::Summarize
        };
        Ok(ctx
            .generator
            .generate(&ctx.processed.decontextualized_query, mode, results, cancel)
            .await)
    }
}

// ---------------------------------------------------------------------------
// compare
// ---------------------------------------------------------------------------

/// Comparator phrases checked in order; longer forms first so " vs. " is not
/// shadowed by " vs ".
const COMPARE_SEPARATORS: &[&str] = &[
    " compared with ",
    " compared to ",
    " versus ",
    " vs. ",
    " vs ",
];

/// Lead-ins stripped before splitting.
const COMPARE_PREFIXES: &[&str] = &[
    "what is the difference between ",
    "what's the difference between ",
    "difference between ",
    "compare ",
    "contrast ",
];

/// Split a comparison query into its two subject phrases.
///
/// Returns `None` when no comparator structure is found; the handler then
/// reports itself unable and the pipeline falls back to search.
#[must_use]
pub fn split_comparison_subjects(query: &str) -> Option<(String, String)> {
    let trimmed = query.trim().trim_end_matches(['?', '.', '!']);
    let lowered = trimmed.to_lowercase();

    let mut body = trimmed;
    let mut body_lowered = lowered.as_str();
    let mut prefix_stripped = false;
    for prefix in COMPARE_PREFIXES {
        if body_lowered.starts_with(prefix) {
            body = body.get(prefix.len()..).unwrap_or_default();
            body_lowered = body_lowered.get(prefix.len()..).unwrap_or_default();
            prefix_stripped = true;
            break;
        }
    }

    for separator in COMPARE_SEPARATORS {
        if let Some(index) = body_lowered.find(separator) {
            let left = body.get(..index)?.trim();
            let right = body.get(index + separator.len()..)?.trim();
            if !left.is_empty() && !right.is_empty() {
                return Some((left.to_string(), right.to_string()));
            }
        }
    }

    // "difference between A and B" style: the prefix was stripped, split on
    // the conjunction
    if prefix_stripped {
        if let Some(index) = body_lowered.find(" and ") {
            let left = body.get(..index)?.trim();
            let right = body.get(index + " and ".len()..)?.trim();
            if !left.is_empty() && !right.is_empty() {
                return Some((left.to_string(), right.to_string()));
            }
        }
    }

    None
}

/// Side-by-side comparison: two parallel retrievals, one labeled summary.
pub struct CompareHandler {
    priority: i32,
}

impl CompareHandler {
    /// Build with a definition-supplied priority.
    #[must_use]
    pub fn new(priority: i32) -> Self {
        Self { priority }
    }
}

#[async_trait]
impl ToolHandler for CompareHandler {
    fn tool_type(&self) -> ToolType {
        ToolType::Compare
    }

    fn can_handle(&self, processed: &ProcessedQuery) -> bool {
        split_comparison_subjects(&processed.decontextualized_query).is_some()
    }

    fn priority(&self, _processed: &ProcessedQuery) -> i32 {
        self.priority
    }

    async fn execute(
        &self,
        ctx: HandlerContext<'_>,
        cancel: &CancellationToken,
    ) -> Result<GeneratedResponse> {
        let (subject_a, subject_b) =
            split_comparison_subjects(&ctx.processed.decontextualized_query).ok_or_else(|| {
                Error::Internal("comparison query has no recognizable subjects".into())
            })?;

        tracing::debug!(subject_a = %subject_a, subject_b = %subject_b, "Comparing subjects");

        let site = ctx.processed.site.as_deref();
        let max_results = ctx.config.max_results_per_query;
        let (results_a, results_b) = futures::join!(
            ctx.backends.query(&subject_a, site, max_results, cancel),
            ctx.backends.query(&subject_b, site, max_results, cancel),
        );
        let (results_a, results_b) = (results_a?, results_b?);

        Ok(ctx
            .generator
            .generate_comparison(&subject_a, &results_a, &subject_b, &results_b, cancel)
            .await)
    }
}

// ---------------------------------------------------------------------------
// ensemble
// ---------------------------------------------------------------------------

/// Lead-ins stripped to find the topic of a recommendation query.
const ENSEMBLE_PREFIXES: &[&str] = &[
    "recommend me ",
    "recommend ",
    "suggest me ",
    "suggest ",
    "what should i ",
    "a set of ",
    "set of ",
];

/// Cap on parallel sub-queries per ensemble request.
const MAX_ENSEMBLE_QUERIES: usize = 4;

/// Derive the parallel sub-queries for an ensemble request.
///
/// Multi-facet topics ("an appetizer, a main and a dessert") become one
/// sub-query per facet; single topics are expanded with ranking framings.
#[must_use]
pub fn ensemble_expansions(query: &str) -> Vec<String> {
    let trimmed = query.trim().trim_end_matches(['?', '.', '!']);
    let lowered = trimmed.to_lowercase();

    let mut topic = trimmed;
    for prefix in ENSEMBLE_PREFIXES {
        if lowered.starts_with(prefix) {
            topic = topic.get(prefix.len()..).unwrap_or(trimmed);
            break;
        }
    }
    let topic = topic.trim();

    let facets: Vec<&str> = topic
        .split([','])
        .flat_map(|part| part.split(" and "))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    let expansions: Vec<String> = if facets.len() > 1 {
        facets.into_iter().map(str::to_string).collect()
    } else {
        vec![
            topic.to_string(),
            format!("best {topic}"),
            format!("top rated {topic}"),
        ]
    };

    expansions
        .into_iter()
        .take(MAX_ENSEMBLE_QUERIES)
        .collect()
}

/// Merge several ranked lists: URL-dedup keeping the higher score, then order
/// score-descending and truncate.
#[must_use]
pub fn merge_ranked(lists: Vec<Vec<NLWebResult>>, max_results: usize) -> Vec<NLWebResult> {
    let mut merged: Vec<NLWebResult> = Vec::new();
    let mut by_url: HashMap<String, usize> = HashMap::new();
    for result in lists.into_iter().flatten() {
        let key = result.dedup_key();
        match by_url.get(&key) {
            None => {
                by_url.insert(key, merged.len());
                merged.push(result);
            }
            Some(&index) => {
                if result.score > merged[index].score {
                    merged[index] = result;
                }
            }
        }
    }
    merged.sort_by(|a, b| b.score.total_cmp(&a.score));
    merged.truncate(max_results);
    merged
}

/// Recommendation set: keyword-expanded parallel retrievals merged into one
/// grouped summary.
pub struct EnsembleHandler {
    priority: i32,
}

impl EnsembleHandler {
    /// Build with a definition-supplied priority.
    #[must_use]
    pub fn new(priority: i32) -> Self {
        Self { priority }
    }
}

#[async_trait]
impl ToolHandler for EnsembleHandler {
    fn tool_type(&self) -> ToolType {
        ToolType::Ensemble
    }

    fn priority(&self, _processed: &ProcessedQuery) -> i32 {
        self.priority
    }

    async fn execute(
        &self,
        ctx: HandlerContext<'_>,
        cancel: &CancellationToken,
    ) -> Result<GeneratedResponse> {
        let expansions = ensemble_expansions(&ctx.processed.decontextualized_query);
        let site = ctx.processed.site.as_deref();
        let max_results = ctx.config.max_results_per_query;

        let calls = expansions.iter().map(|sub_query| {
            let sub_query = sub_query.clone();
            async move {
                let outcome = ctx
                    .backends
                    .query(&sub_query, site, max_results, cancel)
                    .await;
                (sub_query, outcome)
            }
        });
        let outcomes = futures::future::join_all(calls).await;

        let mut groups: Vec<(String, Vec<NLWebResult>)> = Vec::new();
        let mut failures = 0usize;
        for (sub_query, outcome) in outcomes {
            match outcome {
                Ok(results) => groups.push((sub_query, results)),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => {
                    tracing::warn!(sub_query = %sub_query, error = %err, "Ensemble sub-query failed");
                    failures += 1;
                }
            }
        }
        if groups.is_empty() {
            return Err(Error::BackendUnavailable(format!(
                "all {failures} ensemble sub-queries failed"
            )));
        }

        let merged = merge_ranked(
            groups.iter().map(|(_, results)| results.clone()).collect(),
            max_results,
        );
        Ok(ctx
            .generator
            .generate_grouped(&ctx.processed.query, &groups, merged, cancel)
            .await)
    }
}

// ---------------------------------------------------------------------------
// registry
// ---------------------------------------------------------------------------

/// Maps tool names onto handler instances, built from the tool definitions
/// document.
pub struct HandlerRegistry {
    handlers: HashMap<ToolType, Arc<dyn ToolHandler>>,
}

impl HandlerRegistry {
    /// Instantiate one handler per enabled definition.
    pub fn from_catalog(catalog: &ToolCatalog) -> Result<Self> {
        let mut handlers: HashMap<ToolType, Arc<dyn ToolHandler>> = HashMap::new();
        for definition in catalog.enabled() {
            let tool_type: ToolType = definition.tool_type.parse()?;
            let handler: Arc<dyn ToolHandler> = match tool_type {
                ToolType::Search => Arc::new(SearchHandler::new(definition.priority)),
                ToolType::Compare => Arc::new(CompareHandler::new(definition.priority)),
                ToolType::Details => Arc::new(DetailsHandler::new(definition.priority)),
                ToolType::Ensemble => Arc::new(EnsembleHandler::new(definition.priority)),
            };
            handlers.insert(tool_type, handler);
        }
        if !handlers.contains_key(&ToolType::Search) {
            return Err(Error::Config(
                "tool definitions must enable the search tool".into(),
            ));
        }
        Ok(Self { handlers })
    }

    /// Look up the handler for a tool.
    #[must_use]
    pub fn get(&self, tool: ToolType) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(&tool).map(Arc::clone)
    }

    /// The always-present fallback handler.
    pub fn search(&self) -> Result<Arc<dyn ToolHandler>> {
        self.get(ToolType::Search)
            .ok_or_else(|| Error::Internal("search handler missing from registry".into()))
    }
}
