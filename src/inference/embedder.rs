//! The embedding seam used by the pipeline.

use crate::error::{AppError, Result};
use crate::inference::bi_encoder::EmbeddingModel;
use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Converts text into a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize;
}

/// Batch size used when embedding the tool catalog.
const INDEX_BATCH_SIZE: usize = 32;

/// How long a request waits for a free model session.
const SESSION_WAIT: Duration = Duration::from_secs(10);

/// Admits at most one blocking inference job per model session.
///
/// Callers queue for a permit instead of failing while every session is
/// busy. The permit is held until the blocking job returns.
pub struct InferenceGate {
    permits: Arc<Semaphore>,
    wait: Duration,
}

impl InferenceGate {
    pub fn new(permits: usize, wait: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(permits.max(1))),
            wait,
        }
    }

    /// Run `job` on the blocking pool once a permit is free.
    pub async fn run<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = tokio::time::timeout(self.wait, Arc::clone(&self.permits).acquire_owned())
            .await
            .map_err(|_| {
                AppError::ResourceError("Embedding service overloaded, please retry".to_string())
            })?
            .map_err(|_| AppError::ResourceError("Semaphore closed".to_string()))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|e| AppError::EmbeddingError(format!("Task join error: {}", e)))?
    }
}

/// [`Embedder`] backed by the in-process ONNX model.
///
/// Inference is CPU-bound and runs on the blocking pool, one job per session.
pub struct OnnxEmbedder {
    model: Arc<EmbeddingModel>,
    gate: InferenceGate,
}

impl OnnxEmbedder {
    pub fn new(model: EmbeddingModel) -> Self {
        let gate = InferenceGate::new(model.pool_size(), SESSION_WAIT);
        Self {
            model: Arc::new(model),
            gate,
        }
    }
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Text cannot be empty for embedding generation".to_string(),
            ));
        }

        let model = Arc::clone(&self.model);
        let texts = vec![text.to_string()];
        let mut out = self.gate.run(move || model.encode_batch(&texts)).await?;

        out.pop()
            .ok_or_else(|| AppError::EmbeddingError("Model returned no embedding".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(INDEX_BATCH_SIZE) {
            let model = Arc::clone(&self.model);
            let chunk = chunk.to_vec();
            let embeddings = self.gate.run(move || model.encode_batch(&chunk)).await?;
            out.extend(embeddings);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.model.dimension()
    }
}

/// Hit/miss counters for the embedding memo.
#[derive(Debug, Clone, Serialize)]
pub struct MemoStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub size: usize,
    pub capacity: usize,
}

#[derive(Default)]
struct Memo {
    entries: HashMap<[u8; 32], Vec<f32>>,
    order: VecDeque<[u8; 32]>,
}

/// Bounded text -> embedding memo in front of another [`Embedder`].
///
/// Keys are SHA-256 digests of the text. When full, the oldest entry is
/// evicted first.
pub struct MemoizedEmbedder {
    inner: Arc<dyn Embedder>,
    memo: Mutex<Memo>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoizedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, capacity: usize) -> Self {
        Self {
            inner,
            memo: Mutex::new(Memo::default()),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn key(text: &str) -> [u8; 32] {
        Sha256::digest(text.as_bytes()).into()
    }

    fn get(&self, key: &[u8; 32]) -> Option<Vec<f32>> {
        self.memo
            .lock()
            .ok()
            .and_then(|memo| memo.entries.get(key).cloned())
    }

    fn put(&self, key: [u8; 32], embedding: Vec<f32>) {
        if self.capacity == 0 {
            return;
        }
        let Ok(mut memo) = self.memo.lock() else {
            return;
        };
        if memo.entries.contains_key(&key) {
            return;
        }
        while memo.entries.len() >= self.capacity {
            match memo.order.pop_front() {
                Some(oldest) => {
                    memo.entries.remove(&oldest);
                }
                None => break,
            }
        }
        memo.order.push_back(key);
        memo.entries.insert(key, embedding);
    }

    pub fn stats(&self) -> MemoStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let size = self.memo.lock().map(|m| m.entries.len()).unwrap_or(0);

        MemoStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                (hits as f64 / total as f64 * 1000.0).round() / 10.0
            } else {
                0.0
            },
            size,
            capacity: self.capacity,
        }
    }
}

#[async_trait]
impl Embedder for MemoizedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = Self::key(text);
        if let Some(hit) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }

        let embedding = self.inner.embed(text).await?;
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.put(key, embedding.clone());
        Ok(embedding)
    }

    /// Catalog embedding bypasses the memo; those texts are embedded once.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.inner.embed_batch(texts).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32, 1.0])
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn memoized(capacity: usize) -> (Arc<CountingEmbedder>, MemoizedEmbedder) {
        let inner = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let memo = MemoizedEmbedder::new(inner.clone(), capacity);
        (inner, memo)
    }

    #[tokio::test]
    async fn test_repeated_text_hits_memo() {
        let (inner, memo) = memoized(10);

        let a = memo.embed("list open incidents").await.unwrap();
        let b = memo.embed("list open incidents").await.unwrap();

        assert_eq!(a, b);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        let stats = memo.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert!((stats.hit_rate - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_oldest_entry_is_evicted() {
        let (inner, memo) = memoized(2);

        memo.embed("a").await.unwrap();
        memo.embed("bb").await.unwrap();
        memo.embed("ccc").await.unwrap();
        assert_eq!(memo.stats().size, 2);

        // "a" was evicted, "ccc" is still memoized
        memo.embed("ccc").await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
        memo.embed("a").await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_zero_capacity_disables_memo() {
        let (inner, memo) = memoized(0);

        memo.embed("x").await.unwrap();
        memo.embed("x").await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(memo.stats().size, 0);
    }

    #[tokio::test]
    async fn test_gate_queues_callers_when_all_sessions_busy() {
        let gate = InferenceGate::new(1, Duration::from_secs(5));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let job = |in_flight: Arc<AtomicUsize>, peak: Arc<AtomicUsize>| {
            move || {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(50));
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(now)
            }
        };

        let (a, b) = tokio::join!(
            gate.run(job(in_flight.clone(), peak.clone())),
            gate.run(job(in_flight.clone(), peak.clone())),
        );

        assert_eq!(a.unwrap(), 1);
        assert_eq!(b.unwrap(), 1);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gate_gives_up_after_wait() {
        let gate = InferenceGate::new(1, Duration::from_millis(10));
        let start = Instant::now();

        let (slow, queued) = tokio::join!(
            gate.run(|| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            }),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                gate.run(|| Ok(())).await
            },
        );

        assert!(slow.is_ok());
        assert!(matches!(queued, Err(AppError::ResourceError(_))));
        assert!(start.elapsed() >= Duration::from_millis(300));
    }
}
