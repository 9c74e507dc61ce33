use crate::cache::{CacheEntry, CacheLookup, CachePolicy, CacheStore};
use crate::error::Result;
use crate::inference::cosine;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::SystemTime;

struct Stored {
    embedding: Vec<f32>,
    entry: CacheEntry,
}

/// Linear-scan cache with the same hit contract as the Redis backend.
pub struct InMemoryCache {
    policy: CachePolicy,
    entries: Mutex<Vec<Stored>>,
}

impl InMemoryCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn lookup_at(&self, embedding: &[f32], now: SystemTime) -> CacheLookup {
        let Ok(mut entries) = self.entries.lock() else {
            return CacheLookup::Miss;
        };
        entries.retain(|s| self.policy.is_fresh(s.entry.created_at, now));

        let best = entries
            .iter()
            .map(|s| (cosine(embedding, &s.embedding), s))
            .filter(|(similarity, _)| self.policy.qualifies(*similarity))
            .max_by(|(a, _), (b, _)| a.total_cmp(b));

        match best {
            Some((similarity, stored)) => CacheLookup::Hit {
                entry: stored.entry.clone(),
                similarity,
            },
            None => CacheLookup::Miss,
        }
    }

    pub fn store_at(&self, embedding: &[f32], entry: CacheEntry, now: SystemTime) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        entries.retain(|s| s.entry.query != entry.query && self.policy.is_fresh(s.entry.created_at, now));
        entries.push(Stored {
            embedding: embedding.to_vec(),
            entry,
        });
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn lookup(&self, embedding: &[f32]) -> Result<CacheLookup> {
        Ok(self.lookup_at(embedding, SystemTime::now()))
    }

    async fn store(&self, embedding: &[f32], entry: CacheEntry) -> Result<()> {
        self.store_at(embedding, entry, SystemTime::now());
        Ok(())
    }

    async fn clear(&self) -> Result<usize> {
        Ok(self
            .entries
            .lock()
            .map(|mut entries| entries.drain(..).count())
            .unwrap_or(0))
    }

    async fn len(&self) -> Result<usize> {
        let now = SystemTime::now();
        Ok(self
            .entries
            .lock()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|s| self.policy.is_fresh(s.entry.created_at, now))
                    .count()
            })
            .unwrap_or(0))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
