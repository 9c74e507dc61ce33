//! The MCP tool catalog offered to the LLM.
//!
//! The catalog is loaded once at startup and never mutated; the baseline path
//! forwards all of it, the optimized path forwards the vector-search subset.

pub mod loader;
pub mod types;

pub use loader::{build_embedding_text, parse_catalog};
pub use types::{IndexedTool, OperationType, ToolDescriptor};

use crate::error::{AppError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug)]
pub struct Catalog {
    tools: Vec<ToolDescriptor>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        let by_name = tools
            .iter()
            .enumerate()
            .map(|(idx, tool)| (tool.name.clone(), idx))
            .collect();
        Self { tools, by_name }
    }

    pub fn from_json(json: &Value) -> Result<Self> {
        Ok(Self::new(parse_catalog(json)?))
    }

    /// Load the catalog from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::CatalogError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let json: Value = serde_json::from_str(&raw).map_err(|e| {
            AppError::CatalogError(format!("Invalid JSON in {}: {}", path.display(), e))
        })?;
        let catalog = Self::from_json(&json)?;

        tracing::info!(
            path = %path.display(),
            tools = catalog.len(),
            servers = catalog.server_count(),
            "Tool catalog loaded"
        );

        Ok(catalog)
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.by_name.get(name).map(|&idx| &self.tools[idx])
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn server_count(&self) -> usize {
        let mut servers: Vec<&str> = self.tools.iter().map(|t| t.server.as_str()).collect();
        servers.sort_unstable();
        servers.dedup();
        servers.len()
    }
}
