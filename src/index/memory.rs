use crate::catalog::IndexedTool;
use crate::error::Result;
use crate::index::{rank, ScoredTool, ToolIndex};
use crate::inference::cosine;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Brute-force cosine index, used when Redis is unavailable and in tests.
#[derive(Default)]
pub struct InMemoryToolIndex {
    tools: RwLock<Vec<IndexedTool>>,
}

impl InMemoryToolIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ToolIndex for InMemoryToolIndex {
    async fn rebuild(&self, tools: &[IndexedTool]) -> Result<()> {
        let mut guard = self.tools.write().await;
        *guard = tools.to_vec();
        tracing::info!(tools = guard.len(), "In-memory tool index rebuilt");
        Ok(())
    }

    async fn nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredTool>> {
        let tools = self.tools.read().await;
        let scored = tools
            .iter()
            .enumerate()
            .map(|(seq, indexed)| {
                (
                    seq as u64,
                    ScoredTool {
                        name: indexed.tool.name.clone(),
                        server: indexed.tool.server.clone(),
                        similarity: cosine(embedding, &indexed.embedding),
                    },
                )
            })
            .collect();

        Ok(rank(scored, k))
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.tools.read().await.len())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
