//! Tool selection through a chat-completion model.

pub mod openai;

pub use openai::ChatClient;

use crate::catalog::ToolDescriptor;
use async_trait::async_trait;
use serde::Serialize;

/// GPT-4o list price per input token (USD)
pub const INPUT_COST_PER_TOKEN: f64 = 4.25e-6;
/// GPT-4o list price per output token (USD)
pub const OUTPUT_COST_PER_TOKEN: f64 = 17e-6;

/// Outcome of one tool-selection call.
///
/// Failures are values, not errors: a failed call carries zero usage and the
/// error message, so a comparison can still report the other path.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Selection {
    /// Tools the model invoked, deduplicated, in call order
    pub tools_used: Vec<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub error: Option<String>,
}

impl Selection {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

pub fn estimate_cost(input_tokens: u64, output_tokens: u64) -> f64 {
    input_tokens as f64 * INPUT_COST_PER_TOKEN + output_tokens as f64 * OUTPUT_COST_PER_TOKEN
}

/// Rough token count used when the API reports no usage.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() / 4) as u64
}

#[async_trait]
pub trait ToolSelector: Send + Sync {
    /// Ask the model which of `tools` serve `query`.
    async fn select(&self, query: &str, tools: &[ToolDescriptor]) -> Selection;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_formula() {
        let cost = estimate_cost(1_000_000, 1_000_000);
        assert!((cost - 21.25).abs() < 1e-9);
        assert_eq!(estimate_cost(0, 0), 0.0);
    }

    #[test]
    fn test_failed_selection_has_zero_usage() {
        let s = Selection::failed("timed out");
        assert!(s.is_failed());
        assert_eq!(s.total_tokens(), 0);
        assert_eq!(s.cost, 0.0);
        assert!(s.tools_used.is_empty());
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }
}
