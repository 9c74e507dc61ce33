use crate::catalog::{OperationType, ToolDescriptor};
use crate::error::{AppError, Result};
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Serialize)]
pub struct ToolListResponse {
    pub tools: Vec<ToolDescriptor>,
    pub total: usize,
    pub servers: usize,
}

/// GET /api/tools - The full catalog, as sent on the baseline path
pub async fn list_tools_handler(State(state): State<Arc<AppState>>) -> Json<ToolListResponse> {
    let catalog = state.pipeline.catalog();
    Json(ToolListResponse {
        tools: catalog.tools().to_vec(),
        total: catalog.len(),
        servers: catalog.server_count(),
    })
}

#[derive(Debug, Deserialize)]
pub struct ToolSearchRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Serialize)]
pub struct ToolSearchResult {
    pub name: String,
    pub server: String,
    #[serde(rename = "type")]
    pub operation: Option<OperationType>,
    pub description: Option<String>,
    /// Cosine similarity to the query (higher is more relevant)
    pub similarity: f32,
}

#[derive(Debug, Serialize)]
pub struct ToolSearchResponse {
    pub results: Vec<ToolSearchResult>,
    pub search_time_ms: u64,
}

/// POST /api/tools/search - Nearest tools for a query, without calling the LLM
pub async fn search_tools_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ToolSearchRequest>,
) -> Result<Json<ToolSearchResponse>> {
    if request.query.trim().is_empty() {
        return Err(AppError::ValidationError("Query cannot be empty".to_string()));
    }
    if request.top_k == 0 {
        return Err(AppError::ValidationError("top_k must be at least 1".to_string()));
    }

    let (hits, search_time_ms) = state
        .pipeline
        .search_tools(&request.query, request.top_k)
        .await?;

    let catalog = state.pipeline.catalog();
    let results = hits
        .into_iter()
        .map(|hit| {
            let tool = catalog.get(&hit.name);
            ToolSearchResult {
                operation: tool.map(|t| t.operation),
                description: tool.map(|t| t.description.clone()),
                name: hit.name,
                server: hit.server,
                similarity: hit.similarity,
            }
        })
        .collect();

    Ok(Json(ToolSearchResponse {
        results,
        search_time_ms,
    }))
}
