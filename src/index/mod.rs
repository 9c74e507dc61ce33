//! Nearest-neighbour lookup over the tool catalog.

pub mod memory;
pub mod redis;

pub use self::memory::InMemoryToolIndex;
pub use self::redis::RedisToolIndex;

use crate::catalog::IndexedTool;
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;

/// A tool name with its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredTool {
    pub name: String,
    pub server: String,
    pub similarity: f32,
}

#[async_trait]
pub trait ToolIndex: Send + Sync {
    /// Replace the index contents. Insertion order is the tie-break order
    /// for equal similarities.
    async fn rebuild(&self, tools: &[IndexedTool]) -> Result<()>;

    /// Up to `k` tools by descending similarity. An empty index yields an
    /// empty list.
    async fn nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredTool>>;

    /// Number of indexed tools.
    async fn len(&self) -> Result<usize>;

    /// Whether the index already holds at least `expected` tools, in which
    /// case startup skips re-embedding the catalog.
    async fn covers(&self, expected: usize) -> Result<bool> {
        Ok(expected > 0 && self.len().await? >= expected)
    }

    fn backend(&self) -> &'static str;
}

/// Order by descending similarity, keeping insertion order among equals.
pub(crate) fn rank(mut scored: Vec<(u64, ScoredTool)>, k: usize) -> Vec<ScoredTool> {
    scored.sort_by(|(seq_a, a), (seq_b, b)| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| seq_a.cmp(seq_b))
    });
    scored.into_iter().take(k).map(|(_, tool)| tool).collect()
}
