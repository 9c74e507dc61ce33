//! RediSearch-backed semantic cache.
//!
//! Entries live under `semantic_cache:entry:{sha256(query)}` so storing the
//! same query text twice overwrites. Keys carry a Redis TTL as well as a
//! `cached_at` field checked on read.

use crate::cache::{CacheEntry, CacheLookup, CachePolicy, CacheStore};
use crate::error::Result;
use crate::redisearch::{self, IndexSchema, SearchHit};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use sha2::{Digest, Sha256};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const INDEX_NAME: &str = "semantic_cache";
pub const KEY_PREFIX: &str = "semantic_cache:entry:";

/// Candidates fetched per lookup before threshold and TTL filtering
const LOOKUP_CANDIDATES: usize = 5;

const RETURN_FIELDS: &[&str] = &["query", "response", "tools_used", "tokens", "cost", "cached_at"];

pub struct RedisSemanticCache {
    conn: ConnectionManager,
    policy: CachePolicy,
}

impl RedisSemanticCache {
    /// Connect the cache, creating its vector index if needed.
    pub async fn new(conn: ConnectionManager, policy: CachePolicy, dimension: usize) -> Result<Self> {
        redisearch::ensure_index(
            &conn,
            &IndexSchema {
                name: INDEX_NAME,
                prefix: KEY_PREFIX,
                text_fields: &["query", "response"],
                tag_fields: &[],
                numeric_fields: &["cached_at"],
                dimension,
            },
        )
        .await?;

        Ok(Self { conn, policy })
    }

    pub fn entry_key(query: &str) -> String {
        format!("{}{:x}", KEY_PREFIX, Sha256::digest(query.as_bytes()))
    }
}

fn unix_secs(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Rebuild an entry from the returned hash fields.
fn entry_from_hit(hit: &SearchHit) -> Option<CacheEntry> {
    let cached_at: u64 = hit.field("cached_at")?.parse().ok()?;
    Some(CacheEntry {
        query: hit.field("query").unwrap_or_default().to_string(),
        response: hit.field("response")?.to_string(),
        tools_used: hit
            .field("tools_used")
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default(),
        tokens: hit.field("tokens").and_then(|t| t.parse().ok()).unwrap_or(0),
        cost: hit.field("cost").and_then(|c| c.parse().ok()).unwrap_or(0.0),
        created_at: UNIX_EPOCH + Duration::from_secs(cached_at),
    })
}

#[async_trait]
impl CacheStore for RedisSemanticCache {
    async fn lookup(&self, embedding: &[f32]) -> Result<CacheLookup> {
        let hits =
            redisearch::knn(&self.conn, INDEX_NAME, embedding, LOOKUP_CANDIDATES, RETURN_FIELDS)
                .await?;
        let now = SystemTime::now();

        // Hits arrive by ascending distance, so the first qualifying one is the best
        for hit in &hits {
            let similarity = hit.similarity();
            if !self.policy.qualifies(similarity) {
                tracing::debug!(similarity, "Cache candidate below threshold");
                break;
            }
            match entry_from_hit(hit) {
                Some(entry) if self.policy.is_fresh(entry.created_at, now) => {
                    return Ok(CacheLookup::Hit { entry, similarity });
                }
                Some(_) => tracing::debug!(key = %hit.key, "Cache candidate expired"),
                None => tracing::warn!(key = %hit.key, "Malformed cache entry"),
            }
        }

        Ok(CacheLookup::Miss)
    }

    async fn store(&self, embedding: &[f32], entry: CacheEntry) -> Result<()> {
        let key = Self::entry_key(&entry.query);
        let tools_used = serde_json::to_string(&entry.tools_used).unwrap_or_else(|_| "[]".into());
        let cached_at = unix_secs(entry.created_at).to_string();
        let tokens = entry.tokens.to_string();
        let cost = entry.cost.to_string();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_multiple(
                &key,
                &[
                    ("query", entry.query.as_str()),
                    ("response", entry.response.as_str()),
                    ("tools_used", tools_used.as_str()),
                    ("tokens", tokens.as_str()),
                    ("cost", cost.as_str()),
                    ("cached_at", cached_at.as_str()),
                ],
            )
            .ignore()
            .hset(&key, "embedding", redisearch::vector_to_bytes(embedding))
            .ignore()
            .expire(&key, self.policy.ttl.as_secs() as i64)
            .ignore();

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;

        tracing::debug!(key = %key, ttl_secs = self.policy.ttl.as_secs(), "Cache entry stored");
        Ok(())
    }

    async fn clear(&self) -> Result<usize> {
        redisearch::delete_matching(&self.conn, &format!("{}*", KEY_PREFIX)).await
    }

    async fn len(&self) -> Result<usize> {
        Ok(redisearch::scan_keys(&self.conn, &format!("{}*", KEY_PREFIX))
            .await?
            .len())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
