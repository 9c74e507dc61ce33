use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum AppError {
    #[error("Embedding failed: {0}")]
    EmbeddingError(String),

    #[error("Invalid input: {0}")]
    ValidationError(String),

    #[error("Service temporarily unavailable: {0}")]
    ResourceError(String),

    #[error("Tokenization failed: {0}")]
    TokenizationError(String),

    #[error("Missing or invalid configuration: {0}")]
    ConfigError(String),

    #[error("Upstream request failed: {0}")]
    TransportError(String),

    #[error("Vector store error: {0}")]
    StoreError(String),

    #[error("Catalog error: {0}")]
    CatalogError(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::EmbeddingError(e) => {
                tracing::error!(error = %e, "Embedding error");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::ValidationError(msg) => {
                tracing::warn!(error = %msg, "Validation error");
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            AppError::ResourceError(msg) => {
                tracing::warn!(error = %msg, "Resource error");
                (StatusCode::SERVICE_UNAVAILABLE, msg.clone())
            }
            AppError::TokenizationError(msg) => {
                tracing::error!(error = %msg, "Tokenization error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            AppError::ConfigError(msg) => {
                tracing::error!(error = %msg, "Configuration error");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::TransportError(msg) => {
                tracing::warn!(error = %msg, "Upstream transport error");
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            AppError::StoreError(msg) => {
                tracing::error!(error = %msg, "Vector store error");
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            AppError::CatalogError(msg) => {
                tracing::error!(error = %msg, "Catalog error");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        let body = Json(ErrorResponse {
            error: message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

impl From<ort::Error> for AppError {
    fn from(err: ort::Error) -> Self {
        AppError::EmbeddingError(err.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::StoreError(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::TransportError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
