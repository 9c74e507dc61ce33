//! toolsift - vector pre-filtering and semantic caching for LLM tool selection
//!
//! Compares a baseline path that offers the whole MCP tool catalog to a
//! chat-completion model against an optimized path that offers only the
//! nearest tools and answers repeated read queries from a semantic cache.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod handlers;
pub mod index;
pub mod inference;
pub mod llm;
pub mod pipeline;
pub mod redisearch;
pub mod state;

// Re-export key types for convenience
pub use catalog::{Catalog, OperationType, ToolDescriptor};
pub use config::Config;
pub use error::{AppError, Result};
pub use handlers::api_routes;
pub use pipeline::{Panel, Pipeline, PipelineSettings};
pub use state::AppState;
