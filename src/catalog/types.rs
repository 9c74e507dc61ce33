//! Type definitions for the tool catalog.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Whether invoking a tool reads or mutates state in its owning service.
///
/// Only responses to `Read` queries are eligible for the semantic cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Read,
    Write,
    Other,
}

impl OperationType {
    /// Parse the catalog's `type` field. A missing field means `read`,
    /// anything unrecognised means `other`.
    pub fn from_catalog(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()) {
            None => Self::Read,
            Some(v) if v == "read" => Self::Read,
            Some(v) if v == "write" => Self::Write,
            Some(_) => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One invocable operation exposed by an MCP server.
///
/// Descriptors are immutable once the catalog is loaded; the index is only
/// ever changed by a full rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool identifier (e.g. "jira.create_issue")
    pub name: String,

    /// The MCP server that owns this tool (e.g. "jira")
    pub server: String,

    #[serde(rename = "type")]
    pub operation: OperationType,

    pub description: String,

    /// MCP `inputSchema`, forwarded to the LLM as function parameters
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,

    /// Expanded text fed to the embedding model at index time
    #[serde(skip)]
    pub embedding_text: String,
}

/// A descriptor paired with its precomputed embedding.
#[derive(Debug, Clone)]
pub struct IndexedTool {
    pub tool: ToolDescriptor,
    pub embedding: Vec<f32>,
}
