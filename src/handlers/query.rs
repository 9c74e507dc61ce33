use crate::error::{AppError, Result};
use crate::pipeline::{Comparison, Panel, PathResult};
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// "baseline" or "optimized"; defaults to optimized
    #[serde(default)]
    pub panel: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub query: String,
}

fn validate_query(query: &str) -> Result<&str> {
    let query = query.trim();
    if query.is_empty() {
        return Err(AppError::ValidationError("Query cannot be empty".to_string()));
    }
    Ok(query)
}

/// POST /api/query - Run one path for a query.
///
/// Path failures are reported in the body (`status: "failed"`), not as an
/// HTTP error.
pub async fn query_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<PathResult>> {
    let query = validate_query(&request.query)?;
    let panel = match request.panel.as_deref() {
        Some(panel) => panel.parse::<Panel>()?,
        None => Panel::Optimized,
    };

    tracing::debug!(panel = %panel, query_len = query.len(), "Processing query");
    Ok(Json(state.pipeline.run(panel, query).await))
}

/// POST /api/compare - Run both paths concurrently and fold the result into
/// the demo metrics.
pub async fn compare_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CompareRequest>,
) -> Result<Json<Comparison>> {
    let query = validate_query(&request.query)?;

    let comparison = state.pipeline.compare(query).await;
    state.record_comparison(&comparison).await;

    Ok(Json(comparison))
}
