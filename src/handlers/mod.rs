pub mod admin;
pub mod cache;
pub mod health;
pub mod query;
pub mod tools;

pub use admin::{reindex_handler, reset_metrics_handler, stats_handler};
pub use cache::clear_cache_handler;
pub use health::{health_handler, ready_handler};
pub use query::{compare_handler, query_handler};
pub use tools::{list_tools_handler, search_tools_handler};

use crate::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

/// JSON API and probe routes. The binary adds `/metrics` and middleware.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tools", get(list_tools_handler))
        .route("/api/tools/search", post(search_tools_handler))
        .route("/api/query", post(query_handler))
        .route("/api/compare", post(compare_handler))
        .route("/api/cache", delete(clear_cache_handler))
        .route("/api/performance/stats", get(stats_handler))
        .route("/api/metrics/reset", post(reset_metrics_handler))
        .route("/api/reindex", post(reindex_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
}
