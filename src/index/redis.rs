//! RediSearch-backed tool index.
//!
//! Each tool is a hash `tool:{name}` carrying its metadata, a `seq` number
//! (catalog position, used as the tie-break) and a FLOAT32 `embedding` blob.

use crate::catalog::IndexedTool;
use crate::error::Result;
use crate::index::{rank, ScoredTool, ToolIndex};
use crate::redisearch::{self, IndexSchema};
use async_trait::async_trait;
use redis::aio::ConnectionManager;

pub const INDEX_NAME: &str = "mcp_tools";
pub const KEY_PREFIX: &str = "tool:";

pub struct RedisToolIndex {
    conn: ConnectionManager,
    dimension: usize,
}

impl RedisToolIndex {
    pub fn new(conn: ConnectionManager, dimension: usize) -> Self {
        Self { conn, dimension }
    }

    fn schema(&self) -> IndexSchema<'static> {
        IndexSchema {
            name: INDEX_NAME,
            prefix: KEY_PREFIX,
            text_fields: &["name", "description", "server"],
            tag_fields: &["type"],
            numeric_fields: &["seq"],
            dimension: self.dimension,
        }
    }
}

#[async_trait]
impl ToolIndex for RedisToolIndex {
    async fn rebuild(&self, tools: &[IndexedTool]) -> Result<()> {
        redisearch::drop_index(&self.conn, INDEX_NAME, true).await?;
        let stale = redisearch::delete_matching(&self.conn, &format!("{}*", KEY_PREFIX)).await?;
        if stale > 0 {
            tracing::debug!(keys = stale, "Removed stale tool hashes");
        }
        redisearch::create_index(&self.conn, &self.schema()).await?;

        let mut pipe = redis::pipe();
        for (seq, indexed) in tools.iter().enumerate() {
            let key = format!("{}{}", KEY_PREFIX, indexed.tool.name);
            let seq = seq.to_string();
            pipe.hset_multiple(
                &key,
                &[
                    ("name", indexed.tool.name.as_str()),
                    ("server", indexed.tool.server.as_str()),
                    ("type", indexed.tool.operation.as_str()),
                    ("description", indexed.tool.description.as_str()),
                    ("seq", seq.as_str()),
                ],
            )
            .ignore();
            pipe.hset(&key, "embedding", redisearch::vector_to_bytes(&indexed.embedding))
                .ignore();
        }

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;

        tracing::info!(
            index = INDEX_NAME,
            tools = tools.len(),
            "Redis tool index rebuilt"
        );
        Ok(())
    }

    async fn nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredTool>> {
        let hits = redisearch::knn(&self.conn, INDEX_NAME, embedding, k, &["name", "server", "seq"])
            .await?;

        let scored = hits
            .into_iter()
            .filter_map(|hit| {
                let name = hit.field("name")?.to_string();
                let seq = hit.field("seq").and_then(|s| s.parse().ok()).unwrap_or(u64::MAX);
                Some((
                    seq,
                    ScoredTool {
                        server: hit.field("server").unwrap_or_default().to_string(),
                        similarity: hit.similarity(),
                        name,
                    },
                ))
            })
            .collect();

        Ok(rank(scored, k))
    }

    async fn len(&self) -> Result<usize> {
        let keys = redisearch::scan_keys(&self.conn, &format!("{}*", KEY_PREFIX)).await?;
        Ok(keys.len())
    }

    async fn covers(&self, expected: usize) -> Result<bool> {
        if expected == 0 || !redisearch::index_exists(&self.conn, INDEX_NAME).await? {
            return Ok(false);
        }
        Ok(self.len().await? >= expected)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
