use crate::error::Result;
use crate::inference::MemoStats;
use crate::pipeline::MetricsSummary;
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Serialize)]
pub struct ConfigSummary {
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub cache_ttl_secs: u64,
    pub cache_enabled: bool,
    pub embedding_model: String,
    pub llm_model: String,
}

#[derive(Debug, Serialize)]
pub struct BackendSummary {
    pub index: &'static str,
    pub cache: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CatalogSummary {
    pub tools: usize,
    pub servers: usize,
    pub indexed: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub config: ConfigSummary,
    pub backends: BackendSummary,
    pub catalog: CatalogSummary,
    pub cache_entries: usize,
    pub embedding_memo: Option<MemoStats>,
    pub metrics: MetricsSummary,
}

/// GET /api/performance/stats
pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Result<Json<StatsResponse>> {
    let pipeline = &state.pipeline;
    let catalog = pipeline.catalog();
    let config = &state.config;

    let indexed = pipeline.index().len().await?;
    let cache_entries = pipeline.cache().len().await?;
    let metrics = state.metrics.lock().await.summary();

    Ok(Json(StatsResponse {
        config: ConfigSummary {
            top_k: pipeline.settings().top_k,
            similarity_threshold: config.cache.similarity_threshold,
            cache_ttl_secs: config.cache.ttl.as_secs(),
            cache_enabled: pipeline.settings().cache_enabled,
            embedding_model: config.embedding.model_name.clone(),
            llm_model: config.llm.model.clone(),
        },
        backends: BackendSummary {
            index: pipeline.index().backend(),
            cache: pipeline.cache().backend(),
        },
        catalog: CatalogSummary {
            tools: catalog.len(),
            servers: catalog.server_count(),
            indexed,
        },
        cache_entries,
        embedding_memo: state.memo_stats(),
        metrics,
    }))
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub status: &'static str,
}

/// POST /api/metrics/reset
pub async fn reset_metrics_handler(State(state): State<Arc<AppState>>) -> Json<ResetResponse> {
    state.reset_metrics().await;
    Json(ResetResponse { status: "reset" })
}

#[derive(Debug, Serialize)]
pub struct ReindexResponse {
    pub tools_indexed: usize,
    pub cache_cleared: usize,
    pub elapsed_ms: u64,
}

/// POST /api/reindex - Re-embed the catalog, rebuild the index and clear the cache
pub async fn reindex_handler(State(state): State<Arc<AppState>>) -> Result<Json<ReindexResponse>> {
    let start = Instant::now();
    let (tools_indexed, cache_cleared) = state.pipeline.reindex().await?;

    tracing::info!(tools_indexed, cache_cleared, "Reindex completed");
    Ok(Json(ReindexResponse {
        tools_indexed,
        cache_cleared,
        elapsed_ms: start.elapsed().as_millis() as u64,
    }))
}
