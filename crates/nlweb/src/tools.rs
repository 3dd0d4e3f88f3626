//! Tool definitions document: which tools exist, loaded at startup.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::query::ToolType;

/// The built-in definitions used when no document is configured.
const DEFAULT_TOOL_DEFINITIONS: &str = "\
tools:
  - id: search-default
    name: Search
    type: search
    priority: 0
  - id: compare-default
    name: Compare
    type: compare
    priority: 30
  - id: details-default
    name: Details
    type: details
    priority: 20
  - id: ensemble-default
    name: Ensemble
    type: ensemble
    priority: 10
";

/// One declared tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique non-empty id
    pub id: String,
    /// Display name
    pub name: String,
    /// Must match a registered handler type
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Disabled tools stay in the document but get no handler
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Selection weight
    #[serde(default)]
    pub priority: i32,
    /// Opaque per-tool parameters
    #[serde(default)]
    pub parameters: serde_json::Value,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ToolDocument {
    tools: Vec<ToolDefinition>,
}

/// The validated set of tool definitions.
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    definitions: Vec<ToolDefinition>,
}

impl ToolCatalog {
    /// The built-in catalog: all four tools enabled.
    pub fn load_default() -> Result<Self> {
        Self::from_yaml(DEFAULT_TOOL_DEFINITIONS)
    }

    /// Parse and validate a YAML definitions document.
    pub fn from_yaml(document: &str) -> Result<Self> {
        let document: ToolDocument = serde_yml::from_str(document)
            .map_err(|err| Error::Config(format!("invalid tool definitions: {err}")))?;
        Self::validated(document.tools)
    }

    /// Load a definitions document from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|err| {
            Error::Config(format!(
                "cannot read tool definitions {}: {err}",
                path.display()
            ))
        })?;
        Self::from_yaml(&document)
    }

    fn validated(definitions: Vec<ToolDefinition>) -> Result<Self> {
        if definitions.is_empty() {
            return Err(Error::Config("tool definitions document is empty".into()));
        }
        let mut seen = HashSet::new();
        for definition in &definitions {
            if definition.id.trim().is_empty() {
                return Err(Error::Config("tool definition id must be non-empty".into()));
            }
            if !seen.insert(definition.id.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate tool definition id: {}",
                    definition.id
                )));
            }
            definition.tool_type.parse::<ToolType>().map_err(|_| {
                Error::Config(format!(
                    "tool definition '{}' has unknown type '{}'",
                    definition.id, definition.tool_type
                ))
            })?;
        }
        Ok(Self { definitions })
    }

    /// All definitions, enabled or not.
    #[must_use]
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Enabled definitions only.
    pub fn enabled(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.definitions.iter().filter(|d| d.enabled)
    }
}
