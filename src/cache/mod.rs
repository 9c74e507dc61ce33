//! Semantic cache of optimized-path responses.
//!
//! A lookup hits when a stored query embedding is at least
//! `similarity_threshold` similar to the incoming one and the entry is still
//! within its TTL. Expiry is checked lazily on read.

pub mod memory;
pub mod redis;

pub use self::memory::InMemoryCache;
pub use self::redis::RedisSemanticCache;

use crate::config::CacheConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::time::{Duration, SystemTime};

/// A cached optimized-path response.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Query text the response was produced for
    pub query: String,
    pub response: String,
    pub tools_used: Vec<String>,
    pub tokens: u64,
    pub cost: f64,
    pub created_at: SystemTime,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit { entry: CacheEntry, similarity: f32 },
    Miss,
}

/// Hit threshold and lifetime shared by all cache backends.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub similarity_threshold: f32,
}

impl CachePolicy {
    pub fn is_fresh(&self, created_at: SystemTime, now: SystemTime) -> bool {
        match now.duration_since(created_at) {
            Ok(age) => age < self.ttl,
            // Clock skew: an entry from the future is treated as new
            Err(_) => true,
        }
    }

    pub fn qualifies(&self, similarity: f32) -> bool {
        similarity >= self.similarity_threshold
    }
}

impl From<&CacheConfig> for CachePolicy {
    fn from(config: &CacheConfig) -> Self {
        Self {
            ttl: config.ttl,
            similarity_threshold: config.similarity_threshold,
        }
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Highest-similarity fresh entry at or above the threshold.
    async fn lookup(&self, embedding: &[f32]) -> Result<CacheLookup>;

    /// Insert an entry. An existing entry with the same query text is replaced.
    async fn store(&self, embedding: &[f32], entry: CacheEntry) -> Result<()>;

    /// Remove every entry, returning how many were removed.
    async fn clear(&self) -> Result<usize>;

    async fn len(&self) -> Result<usize>;

    fn backend(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CachePolicy {
        CachePolicy {
            ttl: Duration::from_secs(300),
            similarity_threshold: 0.85,
        }
    }

    #[test]
    fn test_freshness_window() {
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let p = policy();

        assert!(p.is_fresh(t, t + Duration::from_secs(299)));
        assert!(!p.is_fresh(t, t + Duration::from_secs(300)));
        assert!(p.is_fresh(t, t - Duration::from_secs(5)));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let p = policy();
        assert!(p.qualifies(0.85));
        assert!(p.qualifies(0.99));
        assert!(!p.qualifies(0.849));
    }
}
