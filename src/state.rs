use crate::cache::{CachePolicy, CacheStore, InMemoryCache, RedisSemanticCache};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::index::{InMemoryToolIndex, RedisToolIndex, ToolIndex};
use crate::inference::{Embedder, EmbeddingModel, MemoStats, MemoizedEmbedder, OnnxEmbedder};
use crate::llm::{ChatClient, ToolSelector};
use crate::pipeline::{Comparison, DemoMetrics, Pipeline, PipelineSettings};
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const REDIS_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Application state shared across all request handlers.
pub struct AppState {
    pub pipeline: Pipeline,
    /// Demo metrics, owned here and replaced on every comparison
    pub metrics: Mutex<DemoMetrics>,
    pub config: Arc<Config>,
    memo: Option<Arc<MemoizedEmbedder>>,
    /// Set once the catalog is indexed
    ready: AtomicBool,
}

impl AppState {
    pub fn new(pipeline: Pipeline, config: Config, memo: Option<Arc<MemoizedEmbedder>>) -> Self {
        Self {
            pipeline,
            metrics: Mutex::new(DemoMetrics::default()),
            config: Arc::new(config),
            memo,
            ready: AtomicBool::new(false),
        }
    }

    /// Build the full service from configuration.
    ///
    /// A missing catalog or embedding model is fatal. An unreachable Redis, or
    /// one without the search module, falls back to in-memory backends.
    pub async fn from_config(config: Config) -> Result<Self> {
        let catalog = Arc::new(Catalog::load(&config.tools_path)?);

        let pool_size = config.embedding.pool_size.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        });
        let model_path = config.embedding.model_path.clone();
        let tokenizer_path = config.embedding.tokenizer_path.clone();
        let max_length = config.embedding.max_length;
        let model = tokio::task::spawn_blocking(move || {
            EmbeddingModel::load(&model_path, &tokenizer_path, max_length, pool_size)
        })
        .await
        .map_err(|e| AppError::EmbeddingError(format!("Model load task failed: {}", e)))??;

        let dimension = model.dimension();
        let onnx: Arc<dyn Embedder> = Arc::new(OnnxEmbedder::new(model));
        let memo = Arc::new(MemoizedEmbedder::new(onnx, config.embedding.memo_capacity));

        let policy = CachePolicy::from(&config.cache);
        let (index, cache) =
            connect_backends(&config.redis_url, policy, dimension, config.store_timeout).await;

        let selector: Arc<dyn ToolSelector> = Arc::new(ChatClient::new(config.llm.clone())?);

        let pipeline = Pipeline::new(
            catalog,
            memo.clone(),
            index,
            cache,
            selector,
            PipelineSettings {
                top_k: config.top_k,
                cache_enabled: config.cache.enabled,
                store_timeout: config.store_timeout,
            },
        );

        let state = Self::new(pipeline, config, Some(memo));
        state.initialize().await?;
        Ok(state)
    }

    /// Index the catalog (unless already indexed) and mark the service ready.
    pub async fn initialize(&self) -> Result<()> {
        self.pipeline.index_catalog(false).await?;
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Check if the service is ready to handle requests.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn memo_stats(&self) -> Option<MemoStats> {
        self.memo.as_ref().map(|memo| memo.stats())
    }

    pub async fn record_comparison(&self, comparison: &Comparison) {
        let mut metrics = self.metrics.lock().await;
        *metrics = std::mem::take(&mut *metrics).record(comparison);
    }

    pub async fn reset_metrics(&self) {
        *self.metrics.lock().await = DemoMetrics::default();
        tracing::info!("Demo metrics reset");
    }
}

async fn connect_redis(url: &str, response_timeout: Duration) -> Result<ConnectionManager> {
    let client = redis::Client::open(url)?;
    let manager_config = ConnectionManagerConfig::new()
        .set_connection_timeout(REDIS_CONNECT_TIMEOUT)
        .set_response_timeout(response_timeout);
    let mut conn = tokio::time::timeout(
        REDIS_CONNECT_TIMEOUT,
        ConnectionManager::new_with_config(client, manager_config),
    )
    .await
    .map_err(|_| AppError::StoreError(format!("Timed out connecting to {}", url)))??;

    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    Ok(conn)
}

/// Connect the RediSearch index and cache, or fall back to in-memory
/// backends when Redis cannot be reached.
pub(crate) async fn connect_backends(
    url: &str,
    policy: CachePolicy,
    dimension: usize,
    response_timeout: Duration,
) -> (Arc<dyn ToolIndex>, Arc<dyn CacheStore>) {
    let redis_backends = async {
        let conn = connect_redis(url, response_timeout).await?;
        let cache = RedisSemanticCache::new(conn.clone(), policy, dimension).await?;
        let index = RedisToolIndex::new(conn, dimension);
        Ok::<_, AppError>((index, cache))
    };

    match redis_backends.await {
        Ok((index, cache)) => {
            tracing::info!(url, "Connected to Redis, using RediSearch backends");
            (Arc::new(index), Arc::new(cache))
        }
        Err(e) => {
            tracing::warn!(
                url,
                error = %e,
                "Redis unavailable, falling back to in-memory index and cache"
            );
            (
                Arc::new(InMemoryToolIndex::new()),
                Arc::new(InMemoryCache::new(policy)),
            )
        }
    }
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

    #[tokio::test]
    async fn test_unreachable_redis_falls_back_to_memory() {
        let (index, cache) =
            connect_backends("redis://127.0.0.1:1", policy(), 4, Duration::from_secs(1)).await;

        assert_eq!(index.backend(), "memory");
        assert_eq!(cache.backend(), "memory");
        assert_eq!(index.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_redis_url_falls_back_to_memory() {
        let (index, cache) =
            connect_backends("not a redis url", policy(), 4, Duration::from_secs(1)).await;

        assert_eq!(index.backend(), "memory");
        assert_eq!(cache.backend(), "memory");
    }
}
