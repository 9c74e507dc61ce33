//! Baseline and optimized tool-selection paths.
//!
//! The baseline path sends the whole catalog to the selector. The optimized
//! path embeds the query, consults the semantic cache for read queries,
//! narrows the catalog to the top-k nearest tools and sends only those.

pub mod classify;
pub mod metrics;

pub use classify::classify_query;
pub use metrics::{Comparison, DemoMetrics, HistoryRecord, MetricsSummary};

use crate::cache::{CacheEntry, CacheLookup, CacheStore};
use crate::catalog::{build_embedding_text, Catalog, IndexedTool, OperationType, ToolDescriptor};
use crate::error::{AppError, Result};
use crate::index::{ScoredTool, ToolIndex};
use crate::inference::Embedder;
use crate::llm::{Selection, ToolSelector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Panel {
    Baseline,
    Optimized,
}

impl Panel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Optimized => "optimized",
        }
    }
}

impl fmt::Display for Panel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Panel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "baseline" => Ok(Self::Baseline),
            "optimized" => Ok(Self::Optimized),
            other => Err(AppError::ValidationError(format!(
                "Unknown panel '{}', expected 'baseline' or 'optimized'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheStatus {
    Hit,
    Miss,
    Bypass,
}

/// Terminal state of one path. A failed path carries zero-valued metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PathStatus {
    Completed,
    Failed,
}

/// Outcome and measurements of one path for one query.
#[derive(Debug, Clone, Serialize)]
pub struct PathResult {
    pub panel: Panel,
    pub response: String,
    /// Wall-clock seconds
    pub latency: f64,
    pub tokens: u64,
    /// USD
    pub cost: f64,
    /// Tools sent to the selector
    pub tools_count: usize,
    pub cache_status: CacheStatus,
    /// Milliseconds spent in the vector index
    pub vector_search_time: u64,
    /// Cache-hit similarity, in percent
    pub similarity: Option<f32>,
    pub original_query: Option<String>,
    pub tools_used: Vec<String>,
    pub filtered_tools: Vec<String>,
    pub status: PathStatus,
    pub error: Option<String>,
    /// Whether the semantic cache was looked up for this run
    #[serde(skip)]
    pub cache_consulted: bool,
}

impl PathResult {
    fn failed(panel: Panel, cache_status: CacheStatus, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            panel,
            response: format!("{}: failed ({})", panel.as_str().to_uppercase(), error),
            latency: 0.0,
            tokens: 0,
            cost: 0.0,
            tools_count: 0,
            cache_status,
            vector_search_time: 0,
            similarity: None,
            original_query: None,
            tools_used: Vec::new(),
            filtered_tools: Vec::new(),
            status: PathStatus::Failed,
            error: Some(error),
            cache_consulted: false,
        }
    }

    fn with_cache_consulted(mut self, consulted: bool) -> Self {
        self.cache_consulted = consulted;
        self
    }
}

/// Summary line shown for a path, e.g. "OPTIMIZED: 1 of 3 tools selected (67% reduction)".
///
/// The optimized reduction is how many of the offered tools the model left
/// unused.
pub fn summarize_selection(panel: Panel, selected: usize, offered: usize) -> String {
    let label = panel.as_str().to_uppercase();
    if selected == 0 {
        return format!("{}: No tools selected", label);
    }

    let mut summary = format!("{}: {} of {} tools selected", label, selected, offered);
    if panel == Panel::Optimized && offered > 0 {
        let reduction = 100.0 - selected as f64 / offered as f64 * 100.0;
        summary.push_str(&format!(" ({:.0}% reduction)", reduction));
    }
    summary
}

fn elapsed_secs(start: Instant) -> f64 {
    (start.elapsed().as_secs_f64() * 1000.0).round() / 1000.0
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub top_k: usize,
    pub cache_enabled: bool,
    /// Deadline for each vector index or cache call
    pub store_timeout: Duration,
}

pub struct Pipeline {
    catalog: Arc<Catalog>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn ToolIndex>,
    cache: Arc<dyn CacheStore>,
    selector: Arc<dyn ToolSelector>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        catalog: Arc<Catalog>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn ToolIndex>,
        cache: Arc<dyn CacheStore>,
        selector: Arc<dyn ToolSelector>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            catalog,
            embedder,
            index,
            cache,
            selector,
            settings,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn index(&self) -> &dyn ToolIndex {
        self.index.as_ref()
    }

    pub fn cache(&self) -> &dyn CacheStore {
        self.cache.as_ref()
    }

    pub fn settings(&self) -> PipelineSettings {
        self.settings
    }

    /// Embed the catalog and load it into the index.
    ///
    /// Unless `force` is set, indexing is skipped when the index already
    /// covers the catalog. Returns the number of tools indexed.
    pub async fn index_catalog(&self, force: bool) -> Result<usize> {
        let tools = self.catalog.tools();
        if !force && self.index.covers(tools.len()).await? {
            tracing::info!(
                tools = tools.len(),
                backend = self.index.backend(),
                "Tool index already populated, skipping indexing"
            );
            return Ok(0);
        }

        let start = Instant::now();
        let texts: Vec<String> = tools
            .iter()
            .map(|tool| {
                if tool.embedding_text.is_empty() {
                    build_embedding_text(
                        &tool.name,
                        &tool.server,
                        tool.operation,
                        &tool.description,
                        &tool.input_schema,
                    )
                } else {
                    tool.embedding_text.clone()
                }
            })
            .collect();

        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != tools.len() {
            return Err(AppError::EmbeddingError(format!(
                "Expected {} tool embeddings, got {}",
                tools.len(),
                embeddings.len()
            )));
        }

        let indexed: Vec<IndexedTool> = tools
            .iter()
            .cloned()
            .zip(embeddings)
            .map(|(tool, embedding)| IndexedTool { tool, embedding })
            .collect();

        self.index.rebuild(&indexed).await?;

        tracing::info!(
            tools = indexed.len(),
            backend = self.index.backend(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Tool catalog indexed"
        );
        Ok(indexed.len())
    }

    /// Rebuild the tool index from scratch and drop every cached response.
    /// Returns (tools indexed, cache entries cleared).
    pub async fn reindex(&self) -> Result<(usize, usize)> {
        let indexed = self.index_catalog(true).await?;
        let cleared = self.cache.clear().await?;
        Ok((indexed, cleared))
    }

    pub async fn clear_cache(&self) -> Result<usize> {
        let cleared = self.store_call("cache clear", self.cache.clear()).await?;
        tracing::info!(cleared, backend = self.cache.backend(), "Semantic cache cleared");
        Ok(cleared)
    }

    /// Nearest tools for a free-text query, with the search time in milliseconds.
    pub async fn search_tools(&self, query: &str, k: usize) -> Result<(Vec<ScoredTool>, u64)> {
        let embedding = self.embedder.embed(query).await?;
        let start = Instant::now();
        let hits = self
            .store_call("vector search", self.index.nearest(&embedding, k))
            .await?;
        Ok((hits, start.elapsed().as_millis() as u64))
    }

    pub async fn run(&self, panel: Panel, query: &str) -> PathResult {
        match panel {
            Panel::Baseline => self.run_baseline(query).await,
            Panel::Optimized => self.run_optimized(query).await,
        }
    }

    pub async fn run_baseline(&self, query: &str) -> PathResult {
        let start = Instant::now();
        let tools = self.catalog.tools();

        let selection = self.selector.select(query, tools).await;
        if let Some(error) = selection.error {
            tracing::warn!(panel = "baseline", error = %error, "Path failed");
            return PathResult::failed(Panel::Baseline, CacheStatus::Bypass, error);
        }

        let result = PathResult {
            panel: Panel::Baseline,
            response: summarize_selection(Panel::Baseline, selection.tools_used.len(), tools.len()),
            latency: elapsed_secs(start),
            tokens: selection.input_tokens + selection.output_tokens,
            cost: selection.cost,
            tools_count: tools.len(),
            cache_status: CacheStatus::Bypass,
            vector_search_time: 0,
            similarity: None,
            original_query: None,
            tools_used: selection.tools_used,
            filtered_tools: Vec::new(),
            status: PathStatus::Completed,
            error: None,
            cache_consulted: false,
        };

        record_path_metrics(&result);
        tracing::info!(
            panel = "baseline",
            latency = result.latency,
            tokens = result.tokens,
            tools_sent = result.tools_count,
            "Path completed"
        );
        result
    }

    pub async fn run_optimized(&self, query: &str) -> PathResult {
        let start = Instant::now();
        let operation = classify_query(query);
        let cacheable = self.settings.cache_enabled && operation == OperationType::Read;
        let cache_status = if cacheable {
            CacheStatus::Miss
        } else {
            CacheStatus::Bypass
        };

        let embedding = match self.embedder.embed(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!(panel = "optimized", error = %e, "Query embedding failed");
                return PathResult::failed(Panel::Optimized, cache_status, e.to_string());
            }
        };

        if cacheable {
            if let Some(hit) = self.check_cache(&embedding, start).await {
                return hit;
            }
        }

        let search_start = Instant::now();
        let nearest = match self
            .store_call("vector search", self.index.nearest(&embedding, self.settings.top_k))
            .await
        {
            Ok(nearest) => nearest,
            Err(e) => {
                tracing::warn!(panel = "optimized", error = %e, "Vector search failed");
                return PathResult::failed(Panel::Optimized, cache_status, e.to_string())
                    .with_cache_consulted(cacheable);
            }
        };
        let vector_search_time = search_start.elapsed().as_millis() as u64;
        ::metrics::histogram!("vector_search_ms").record(search_start.elapsed().as_secs_f64() * 1000.0);

        let filtered: Vec<ToolDescriptor> = nearest
            .iter()
            .filter_map(|hit| self.catalog.get(&hit.name).cloned())
            .collect();
        let filtered_tools: Vec<String> = filtered.iter().map(|t| t.name.clone()).collect();

        tracing::info!(
            operation = %operation,
            candidates = nearest.len(),
            tools_kept = filtered.len(),
            catalog = self.catalog.len(),
            search_ms = vector_search_time,
            "Vector filtering complete"
        );

        let selection = if filtered.is_empty() {
            tracing::info!("No tools available for query, skipping selector");
            Selection::default()
        } else {
            self.selector.select(query, &filtered).await
        };

        if let Some(error) = selection.error {
            tracing::warn!(panel = "optimized", error = %error, "Path failed");
            return PathResult::failed(Panel::Optimized, cache_status, error)
                .with_cache_consulted(cacheable);
        }

        let response = if filtered.is_empty() {
            "OPTIMIZED: No tools available".to_string()
        } else {
            summarize_selection(Panel::Optimized, selection.tools_used.len(), filtered.len())
        };
        let tokens = selection.input_tokens + selection.output_tokens;

        if cacheable && !filtered.is_empty() {
            let entry = CacheEntry {
                query: query.to_string(),
                response: response.clone(),
                tools_used: selection.tools_used.clone(),
                tokens,
                cost: selection.cost,
                created_at: SystemTime::now(),
            };
            if let Err(e) = self
                .store_call("cache store", self.cache.store(&embedding, entry))
                .await
            {
                tracing::warn!(error = %e, "Failed to store cache entry");
            }
        }

        let result = PathResult {
            panel: Panel::Optimized,
            response,
            latency: elapsed_secs(start),
            tokens,
            cost: selection.cost,
            tools_count: filtered.len(),
            cache_status,
            vector_search_time,
            similarity: None,
            original_query: None,
            tools_used: selection.tools_used,
            filtered_tools,
            status: PathStatus::Completed,
            error: None,
            cache_consulted: cacheable,
        };

        record_path_metrics(&result);
        tracing::info!(
            panel = "optimized",
            latency = result.latency,
            tokens = result.tokens,
            tools_sent = result.tools_count,
            cache_status = ?result.cache_status,
            "Path completed"
        );
        result
    }

    /// A lookup error or timeout degrades to a miss.
    async fn check_cache(&self, embedding: &[f32], start: Instant) -> Option<PathResult> {
        let lookup = match self.store_call("cache lookup", self.cache.lookup(embedding)).await {
            Ok(lookup) => lookup,
            Err(e) => {
                tracing::warn!(error = %e, "Cache lookup failed, treating as miss");
                CacheLookup::Miss
            }
        };

        match lookup {
            CacheLookup::Hit { entry, similarity } => {
                let percent = (similarity * 1000.0).round() / 10.0;
                ::metrics::counter!("cache_hits_total").increment(1);
                tracing::info!(
                    similarity = percent,
                    original_query = %entry.query,
                    "Semantic cache hit"
                );

                let result = PathResult {
                    panel: Panel::Optimized,
                    response: entry.response,
                    latency: elapsed_secs(start),
                    tokens: 0,
                    cost: 0.0,
                    tools_count: 0,
                    cache_status: CacheStatus::Hit,
                    vector_search_time: 0,
                    similarity: Some(percent),
                    original_query: Some(entry.query),
                    tools_used: entry.tools_used,
                    filtered_tools: Vec::new(),
                    status: PathStatus::Completed,
                    error: None,
                    cache_consulted: true,
                };
                record_path_metrics(&result);
                Some(result)
            }
            CacheLookup::Miss => {
                ::metrics::counter!("cache_misses_total").increment(1);
                None
            }
        }
    }

    /// Await a vector-store call, failing with a store error once the
    /// configured deadline passes.
    async fn store_call<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let deadline = self.settings.store_timeout;
        tokio::time::timeout(deadline, call).await.map_err(|_| {
            AppError::StoreError(format!("{} timed out after {}s", operation, deadline.as_secs_f64()))
        })?
    }

    /// Run both paths concurrently. Each path builds its own result; they are
    /// merged once both are done.
    pub async fn compare(&self, query: &str) -> Comparison {
        let (baseline, optimized) = tokio::join!(self.run_baseline(query), self.run_optimized(query));
        let comparison = Comparison::new(query, baseline, optimized);

        tracing::info!(
            id = %comparison.id,
            latency_reduction = comparison.latency_reduction,
            token_reduction = comparison.token_reduction,
            cost_reduction = comparison.cost_reduction,
            "Comparison completed"
        );
        comparison
    }
}

fn record_path_metrics(result: &PathResult) {
    let path = result.panel.as_str();
    ::metrics::counter!("query_requests_total", "path" => path).increment(1);
    ::metrics::histogram!("query_latency_ms", "path" => path).record(result.latency * 1000.0);
    ::metrics::counter!("query_tokens_total", "path" => path).increment(result.tokens);
}
