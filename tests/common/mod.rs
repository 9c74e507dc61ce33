//! Deterministic stand-ins for the embedding model, the vector store and the
//! chat-completion API.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use toolsift::cache::{CacheEntry, CacheLookup, CachePolicy, CacheStore, InMemoryCache};
use toolsift::catalog::{Catalog, IndexedTool, ToolDescriptor};
use toolsift::index::{InMemoryToolIndex, ScoredTool, ToolIndex};
use toolsift::inference::Embedder;
use toolsift::llm::{estimate_cost, Selection, ToolSelector};
use toolsift::{AppError, AppState, Config, Pipeline, PipelineSettings};

pub const STORE_TIMEOUT: Duration = Duration::from_secs(30);

const VOCABULARY: &[&str] = &[
    "create", "incident", "payment", "outage", "issue", "bug", "ticket", "customer", "support",
    "send", "message", "channel", "search", "list", "show", "open", "page", "service",
];

/// Bag-of-words embedder over a fixed vocabulary.
pub struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> toolsift::Result<Vec<f32>> {
        let lowered = text.to_lowercase();
        let mut v = vec![0.0f32; VOCABULARY.len() + 1];
        for word in lowered.split(|c: char| !c.is_alphanumeric()) {
            if let Some(i) = VOCABULARY.iter().position(|w| *w == word) {
                v[i] += 1.0;
            }
        }
        // Keeps every vector non-zero
        v[VOCABULARY.len()] = 0.1;
        Ok(v)
    }

    fn dimension(&self) -> usize {
        VOCABULARY.len() + 1
    }
}

/// Embedder whose backing service is down.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> toolsift::Result<Vec<f32>> {
        Err(AppError::EmbeddingError("embedding service unreachable".to_string()))
    }

    fn dimension(&self) -> usize {
        VOCABULARY.len() + 1
    }
}

/// Index whose searches fail, or never answer when `stalled`.
pub struct BrokenIndex {
    pub stalled: bool,
}

#[async_trait]
impl ToolIndex for BrokenIndex {
    async fn rebuild(&self, _tools: &[IndexedTool]) -> toolsift::Result<()> {
        Ok(())
    }

    async fn nearest(&self, _embedding: &[f32], _k: usize) -> toolsift::Result<Vec<ScoredTool>> {
        if self.stalled {
            std::future::pending::<()>().await;
        }
        Err(AppError::StoreError("connection refused".to_string()))
    }

    async fn len(&self) -> toolsift::Result<usize> {
        Ok(4)
    }

    fn backend(&self) -> &'static str {
        "broken"
    }
}

/// Cache whose every call fails.
pub struct FailingCache;

#[async_trait]
impl CacheStore for FailingCache {
    async fn lookup(&self, _embedding: &[f32]) -> toolsift::Result<CacheLookup> {
        Err(AppError::StoreError("cache unreachable".to_string()))
    }

    async fn store(&self, _embedding: &[f32], _entry: CacheEntry) -> toolsift::Result<()> {
        Err(AppError::StoreError("cache unreachable".to_string()))
    }

    async fn clear(&self) -> toolsift::Result<usize> {
        Err(AppError::StoreError("cache unreachable".to_string()))
    }

    async fn len(&self) -> toolsift::Result<usize> {
        Ok(0)
    }

    fn backend(&self) -> &'static str {
        "failing"
    }
}

/// Selector that "calls" the first offered tool and counts invocations.
#[derive(Default)]
pub struct ScriptedSelector {
    pub calls: AtomicUsize,
    pub offered: Mutex<Vec<Vec<String>>>,
    pub fail_with: Option<String>,
}

impl ScriptedSelector {
    pub fn failing(error: &str) -> Self {
        Self {
            fail_with: Some(error.to_string()),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolSelector for ScriptedSelector {
    async fn select(&self, _query: &str, tools: &[ToolDescriptor]) -> Selection {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.offered
            .lock()
            .unwrap()
            .push(tools.iter().map(|t| t.name.clone()).collect());

        if let Some(error) = &self.fail_with {
            return Selection::failed(error.clone());
        }

        let input_tokens = 150 * tools.len() as u64;
        let output_tokens = 20;
        Selection {
            tools_used: tools.iter().take(1).map(|t| t.name.clone()).collect(),
            input_tokens,
            output_tokens,
            cost: estimate_cost(input_tokens, output_tokens),
            error: None,
        }
    }
}

/// Four tools, one per server.
pub fn scenario_catalog() -> Value {
    json!({
        "pagerduty": [{
            "name": "pagerduty.create_incident",
            "type": "write",
            "description": "Create a new incident and page on-call for a service outage"
        }],
        "jira": [{
            "name": "jira.create_issue",
            "type": "write",
            "description": "Create a new Jira issue for a bug"
        }],
        "zendesk": [{
            "name": "zendesk.search_tickets",
            "type": "read",
            "description": "Search customer support tickets"
        }],
        "slack": [{
            "name": "slack.send_message",
            "type": "write",
            "description": "Send a message to a channel"
        }]
    })
}

pub fn test_config() -> Config {
    Config::from_lookup(|key: &str| match key {
        "OPENAI_API_KEY" => Some("sk-test".to_string()),
        _ => None,
    })
    .unwrap()
}

pub fn policy() -> CachePolicy {
    CachePolicy {
        ttl: Duration::from_secs(300),
        similarity_threshold: 0.85,
    }
}

pub struct Harness {
    pub pipeline: Pipeline,
    pub selector: Arc<ScriptedSelector>,
    pub cache: Arc<InMemoryCache>,
}

pub fn settings(top_k: usize, store_timeout: Duration) -> PipelineSettings {
    PipelineSettings {
        top_k,
        cache_enabled: true,
        store_timeout,
    }
}

/// Pipeline over the scenario catalog with the given backends.
pub fn pipeline_with(
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn ToolIndex>,
    cache: Arc<dyn CacheStore>,
    selector: Arc<ScriptedSelector>,
    store_timeout: Duration,
) -> Pipeline {
    let catalog = Arc::new(Catalog::from_json(&scenario_catalog()).unwrap());
    Pipeline::new(catalog, embedder, index, cache, selector, settings(3, store_timeout))
}

pub fn harness_with(top_k: usize, selector: ScriptedSelector) -> Harness {
    let catalog = Arc::new(Catalog::from_json(&scenario_catalog()).unwrap());
    let selector = Arc::new(selector);
    let cache = Arc::new(InMemoryCache::new(policy()));

    let pipeline = Pipeline::new(
        catalog,
        Arc::new(KeywordEmbedder),
        Arc::new(InMemoryToolIndex::new()),
        cache.clone(),
        selector.clone(),
        settings(top_k, STORE_TIMEOUT),
    );

    Harness {
        pipeline,
        selector,
        cache,
    }
}

/// Pipeline over the scenario catalog, already indexed.
pub async fn indexed_harness(top_k: usize) -> Harness {
    let harness = harness_with(top_k, ScriptedSelector::default());
    harness.pipeline.index_catalog(true).await.unwrap();
    harness
}

/// Application state over the scenario catalog, indexed and ready.
pub async fn ready_state() -> Arc<AppState> {
    let Harness { pipeline, .. } = harness_with(3, ScriptedSelector::default());
    let state = AppState::new(pipeline, test_config(), None);
    state.initialize().await.unwrap();
    Arc::new(state)
}
