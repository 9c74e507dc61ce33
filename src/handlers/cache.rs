use crate::error::Result;
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct ClearCacheResponse {
    pub cleared: usize,
    pub message: String,
}

/// DELETE /api/cache - Drop every semantic cache entry
pub async fn clear_cache_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ClearCacheResponse>> {
    let cleared = state.pipeline.clear_cache().await?;
    Ok(Json(ClearCacheResponse {
        cleared,
        message: format!("Cleared {} cache entries", cleared),
    }))
}
