//! Keyword-based tool routing for decontextualized queries.

use serde::{Deserialize, Serialize};

use super::processor::ProcessedQuery;
use crate::error::Error;
use crate::models::Mode;

/// The closed set of tool strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    /// Plain retrieval shaped by the request mode
    Search,
    /// Side-by-side comparison of two subjects
    Compare,
    /// Focused lookup of one subject's specifics
    Details,
    /// Multi-query recommendation set
    Ensemble,
}

impl ToolType {
    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::Search => "search",
            ToolType::Compare => "compare",
            ToolType::Details => "details",
            ToolType::Ensemble => "ensemble",
        }
    }

    /// All known tool types, in selection-priority order.
    #[must_use]
    pub fn all() -> &'static [ToolType] {
        &[
            ToolType::Compare,
            ToolType::Details,
            ToolType::Ensemble,
            ToolType::Search,
        ]
    }
}

impl std::fmt::Display for ToolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ToolType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.trim().to_ascii_lowercase().as_str() {
            "search" => Ok(ToolType::Search),
            "compare" => Ok(ToolType::Compare),
            "details" => Ok(ToolType::Details),
            "ensemble" => Ok(ToolType::Ensemble),
            other => Err(Error::InvalidArgument(format!("unknown tool type: {other}"))),
        }
    }
}

/// Keyword sets, checked in priority order: compare > details > ensemble > search.
const COMPARE_KEYWORDS: &[&str] = &["compare", "difference", "versus", "vs", "contrast"];
const DETAILS_KEYWORDS: &[&str] = &["details", "information about", "tell me about", "describe"];
const ENSEMBLE_KEYWORDS: &[&str] = &["recommend", "suggest", "what should", "ensemble", "set of"];
const SEARCH_KEYWORDS: &[&str] = &["search", "find", "look for", "locate"];

/// Chooses a tool for the decontextualized query, or `None` for the default
/// flow.
///
/// A model-based classifier may replace the keyword matcher as long as its
/// output stays within the registered tool set.
#[derive(Debug, Clone)]
pub struct ToolSelector {
    enabled: bool,
}

impl ToolSelector {
    /// Build a selector.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Apply the selection rules, first match wins.
    #[must_use]
    pub fn select(&self, processed: &ProcessedQuery) -> Option<ToolType> {
        if !self.enabled {
            return None;
        }
        // Generate keeps the legacy path
        if processed.mode == Mode::Generate {
            return None;
        }
        // A caller that pre-decontextualized has chosen for itself
        if processed.decontextualized_on_input {
            return None;
        }

        let lowered = processed.decontextualized_query.to_lowercase();
        for (tool, keywords) in [
            (ToolType::Compare, COMPARE_KEYWORDS),
            (ToolType::Details, DETAILS_KEYWORDS),
            (ToolType::Ensemble, ENSEMBLE_KEYWORDS),
            (ToolType::Search, SEARCH_KEYWORDS),
        ] {
            if keywords.iter().any(|keyword| lowered.contains(keyword)) {
                tracing::debug!(tool = %tool, "Selected tool by keyword");
                return Some(tool);
            }
        }

        Some(ToolType::Search)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processed(query: &str) -> ProcessedQuery {
        ProcessedQuery {
            query_id: "q".into(),
            query: query.into(),
            decontextualized_query: query.into(),
            mode: Mode::List,
            site: None,
            decontextualized_on_input: false,
            warnings: Vec::new(),
        }
    }

    fn selector() -> ToolSelector {
        ToolSelector::new(true)
    }

    #[test]
    fn test_disabled_selector_returns_none() {
        let selector = ToolSelector::new(false);
        assert_eq!(selector.select(&processed("compare a vs b")), None);
    }

    #[test]
    fn test_generate_mode_skips_selection() {
        let mut query = processed("compare a vs b");
        query.mode = Mode::Generate;
        assert_eq!(selector().select(&query), None);
    }

    #[test]
    fn test_supplied_decontextualized_query_skips_selection() {
        let mut query = processed("compare a vs b");
        query.decontextualized_on_input = true;
        assert_eq!(selector().select(&query), None);
    }

    #[test]
    fn test_compare_keywords() {
        for query in [
            "compare .NET Core vs .NET Framework",
            "what is the difference between red and blue",
            "python versus ruby",
            "contrast these options",
        ] {
            assert_eq!(selector().select(&processed(query)), Some(ToolType::Compare));
        }
    }

    #[test]
    fn test_details_keywords() {
        for query in [
            "tell me about the millennium falcon",
            "information about rust lifetimes",
            "describe the borrow checker",
        ] {
            assert_eq!(selector().select(&processed(query)), Some(ToolType::Details));
        }
    }

    #[test]
    fn test_ensemble_keywords() {
        for query in [
            "recommend a mystery novel",
            "suggest hiking trails near me",
            "what should I cook tonight",
            "a set of matching plates",
        ] {
            assert_eq!(selector().select(&processed(query)), Some(ToolType::Ensemble));
        }
    }

    #[test]
    fn test_search_keywords_and_default() {
        assert_eq!(
            selector().select(&processed("find cheap flights")),
            Some(ToolType::Search)
        );
        // No keyword at all still defaults to search
        assert_eq!(
            selector().select(&processed("millennium falcon")),
            Some(ToolType::Search)
        );
    }

    #[test]
    fn test_compare_outranks_other_categories() {
        // "compare" and "recommend" both present: compare wins
        assert_eq!(
            selector().select(&processed("compare and recommend laptops")),
            Some(ToolType::Compare)
        );
        // "details" and "suggest": details wins
        assert_eq!(
            selector().select(&processed("suggest details on this phone")),
            Some(ToolType::Details)
        );
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert_eq!(
            selector().select(&processed("COMPARE A VS B")),
            Some(ToolType::Compare)
        );
    }

    #[test]
    fn test_tool_type_parse() {
        assert_eq!("compare".parse::<ToolType>().unwrap(), ToolType::Compare);
        assert_eq!(" ENSEMBLE ".parse::<ToolType>().unwrap(), ToolType::Ensemble);
        assert!("rank".parse::<ToolType>().is_err());
    }
}
