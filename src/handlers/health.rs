use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub tools: usize,
    pub index_backend: &'static str,
    pub cache_backend: &'static str,
}

/// GET /health - Liveness probe
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /ready - Readiness probe (catalog indexed, backends connected)
pub async fn ready_handler(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadyResponse>) {
    let (code, status) = if state.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };

    (
        code,
        Json(ReadyResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            tools: state.pipeline.catalog().len(),
            index_backend: state.pipeline.index().backend(),
            cache_backend: state.pipeline.cache().backend(),
        }),
    )
}
