use crate::error::{AppError, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.85;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 30;

/// Settings for the chat-completion gateway.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Fixed per-call timeout. No retries are attempted.
    pub timeout: Duration,
}

/// Settings for the in-process sentence-embedding model.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Human-readable model name, reported by the stats endpoint.
    pub model_name: String,
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub max_length: usize,
    /// Number of ONNX sessions. If None, uses available parallelism.
    pub pool_size: Option<usize>,
    /// Capacity of the text -> embedding memo.
    pub memo_capacity: usize,
}

/// Settings for the semantic cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl: Duration,
    /// Minimum cosine similarity for a hit. A score exactly at the threshold hits.
    pub similarity_threshold: f32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
    pub redis_url: String,
    /// Per-call deadline for the vector index and the semantic cache.
    pub store_timeout: Duration,
    /// Path to the tool catalog JSON file.
    pub tools_path: PathBuf,
    /// Number of tools the optimized path forwards to the LLM.
    pub top_k: usize,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub cache: CacheConfig,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// `OPENAI_API_KEY` is required; everything else falls back to a default.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let api_key = lookup("OPENAI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AppError::ConfigError("OPENAI_API_KEY is not set".to_string()))?;

        let similarity_threshold: f32 = parse(
            "CACHE_SIMILARITY_THRESHOLD",
            &get("CACHE_SIMILARITY_THRESHOLD", &DEFAULT_SIMILARITY_THRESHOLD.to_string()),
        )?;
        if !(0.0..=1.0).contains(&similarity_threshold) {
            return Err(AppError::ConfigError(format!(
                "CACHE_SIMILARITY_THRESHOLD must be within [0, 1], got {}",
                similarity_threshold
            )));
        }

        let top_k: usize = parse("TOP_K", &get("TOP_K", &DEFAULT_TOP_K.to_string()))?;
        if top_k == 0 {
            return Err(AppError::ConfigError("TOP_K must be at least 1".to_string()));
        }

        Ok(Self {
            host: get("HOST", "0.0.0.0"),
            port: parse("PORT", &get("PORT", "8080"))?,
            shutdown_timeout_secs: parse("SHUTDOWN_TIMEOUT", &get("SHUTDOWN_TIMEOUT", "5"))?,
            redis_url: get("REDIS_URL", "redis://127.0.0.1:6379"),
            store_timeout: Duration::from_secs(parse(
                "VECTOR_STORE_TIMEOUT_SECS",
                &get("VECTOR_STORE_TIMEOUT_SECS", &DEFAULT_STORE_TIMEOUT_SECS.to_string()),
            )?),
            tools_path: PathBuf::from(get("TOOLS_PATH", "./data/tools.json")),
            top_k,
            llm: LlmConfig {
                api_key,
                base_url: get("OPENAI_BASE_URL", "https://api.openai.com/v1"),
                model: get("OPENAI_MODEL", "gpt-4o"),
                max_tokens: parse("LLM_MAX_TOKENS", &get("LLM_MAX_TOKENS", "1000"))?,
                temperature: parse("LLM_TEMPERATURE", &get("LLM_TEMPERATURE", "0.1"))?,
                timeout: Duration::from_secs(parse(
                    "LLM_TIMEOUT_SECS",
                    &get("LLM_TIMEOUT_SECS", &DEFAULT_LLM_TIMEOUT_SECS.to_string()),
                )?),
            },
            embedding: EmbeddingConfig {
                model_name: get("EMBEDDING_MODEL", "all-MiniLM-L6-v2"),
                model_path: PathBuf::from(get(
                    "EMBEDDING_MODEL_PATH",
                    "./models/all-MiniLM-L6-v2/model.onnx",
                )),
                tokenizer_path: PathBuf::from(get(
                    "EMBEDDING_TOKENIZER_PATH",
                    "./models/all-MiniLM-L6-v2/tokenizer.json",
                )),
                max_length: parse("EMBEDDING_MAX_LENGTH", &get("EMBEDDING_MAX_LENGTH", "256"))?,
                pool_size: lookup("EMBEDDING_POOL_SIZE")
                    .map(|v| parse("EMBEDDING_POOL_SIZE", &v))
                    .transpose()?,
                memo_capacity: parse(
                    "EMBEDDING_CACHE_SIZE",
                    &get("EMBEDDING_CACHE_SIZE", "1000"),
                )?,
            },
            cache: CacheConfig {
                enabled: parse_flag(
                    "ENABLE_SEMANTIC_CACHE",
                    &get("ENABLE_SEMANTIC_CACHE", "true"),
                )?,
                ttl: Duration::from_secs(parse(
                    "CACHE_TTL_SECS",
                    &get("CACHE_TTL_SECS", &DEFAULT_CACHE_TTL_SECS.to_string()),
                )?),
                similarity_threshold,
            },
        })
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| AppError::ConfigError(format!("{} has invalid value '{}': {}", key, raw, e)))
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AppError::ConfigError(format!(
            "{} has invalid boolean value '{}'",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[("OPENAI_API_KEY", "sk-test")])).unwrap();

        assert_eq!(config.top_k, 3);
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert!((config.cache.similarity_threshold - 0.85).abs() < f32::EPSILON);
        assert_eq!(config.llm.timeout, Duration::from_secs(30));
        assert_eq!(config.store_timeout, Duration::from_secs(30));
        assert!(config.cache.enabled);
        assert_eq!(config.embedding.pool_size, None);
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("TOP_K", "5"),
            ("CACHE_TTL_SECS", "60"),
            ("CACHE_SIMILARITY_THRESHOLD", "0.9"),
            ("ENABLE_SEMANTIC_CACHE", "off"),
            ("EMBEDDING_POOL_SIZE", "2"),
        ]))
        .unwrap();

        assert_eq!(config.top_k, 5);
        assert_eq!(config.cache.ttl, Duration::from_secs(60));
        assert!((config.cache.similarity_threshold - 0.9).abs() < f32::EPSILON);
        assert!(!config.cache.enabled);
        assert_eq!(config.embedding.pool_size, Some(2));
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("PORT", "not-a-port"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("PORT"));

        let err = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("CACHE_SIMILARITY_THRESHOLD", "1.5"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));

        let err = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("TOP_K", "0"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("TOP_K"));
    }
}
