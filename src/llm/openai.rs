//! OpenAI-compatible `/chat/completions` client with function calling.

use crate::catalog::ToolDescriptor;
use crate::config::LlmConfig;
use crate::error::{AppError, Result};
use crate::llm::{estimate_cost, estimate_tokens, Selection, ToolSelector};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

const SYSTEM_PROMPT: &str = "You are an expert system administrator helping with operational tasks. \
Given the user's request and the available tools, call the tools that are directly needed to \
address it. Be selective.";

/// Function names may not contain dots.
pub fn to_function_name(tool_name: &str) -> String {
    tool_name.replace('.', "__")
}

/// Function name -> tool name for the tools offered in one request.
///
/// Tool names may themselves contain `__`, so returned calls are resolved
/// here instead of by reversing [`to_function_name`]. On a collision the first
/// offered tool wins.
fn function_names(tools: &[ToolDescriptor]) -> HashMap<String, &str> {
    let mut names = HashMap::with_capacity(tools.len());
    for tool in tools {
        names
            .entry(to_function_name(&tool.name))
            .or_insert(tool.name.as_str());
    }
    names
}

pub struct ChatClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl ChatClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    pub fn build_request(&self, query: &str, tools: &[ToolDescriptor]) -> Value {
        let mut request = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": query},
            ],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });

        if !tools.is_empty() {
            let functions: Vec<Value> = tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": to_function_name(&tool.name),
                            "description": tool.description,
                            "parameters": tool.input_schema,
                        }
                    })
                })
                .collect();
            request["tools"] = Value::Array(functions);
            request["tool_choice"] = json!("auto");
        }

        request
    }

    async fn complete(&self, query: &str, tools: &[ToolDescriptor]) -> Result<Selection> {
        let request = self.build_request(query, tools);
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::TransportError(format!(
                "Chat completion returned {}: {}",
                status, body
            )));
        }

        let body: Value = response.json().await?;
        Ok(parse_completion(&body, &request, tools))
    }
}

/// Extract invoked tools and usage from a completion body.
pub fn parse_completion(body: &Value, request: &Value, tools: &[ToolDescriptor]) -> Selection {
    let message = &body["choices"][0]["message"];
    let content = message["content"].as_str().unwrap_or_default();

    let offered = function_names(tools);
    let mut seen = HashSet::new();
    let mut tools_used = Vec::new();
    let mut call_text = String::new();

    for call in message["tool_calls"].as_array().into_iter().flatten() {
        let function = &call["function"];
        let Some(function_name) = function["name"].as_str() else {
            continue;
        };
        call_text.push_str(function_name);
        call_text.push_str(function["arguments"].as_str().unwrap_or_default());

        let Some(&name) = offered.get(function_name) else {
            tracing::warn!(function = function_name, "Model called an unknown tool");
            continue;
        };
        if seen.insert(name) {
            tools_used.push(name.to_string());
        }
    }

    let usage = &body["usage"];
    let input_tokens = usage["prompt_tokens"]
        .as_u64()
        .unwrap_or_else(|| estimate_tokens(&request.to_string()));
    let output_tokens = usage["completion_tokens"]
        .as_u64()
        .unwrap_or_else(|| estimate_tokens(content) + estimate_tokens(&call_text));

    Selection {
        tools_used,
        input_tokens,
        output_tokens,
        cost: estimate_cost(input_tokens, output_tokens),
        error: None,
    }
}

#[async_trait]
impl ToolSelector for ChatClient {
    async fn select(&self, query: &str, tools: &[ToolDescriptor]) -> Selection {
        let start = Instant::now();

        match self.complete(query, tools).await {
            Ok(selection) => {
                tracing::info!(
                    tools_offered = tools.len(),
                    tools_used = selection.tools_used.len(),
                    input_tokens = selection.input_tokens,
                    output_tokens = selection.output_tokens,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Tool selection completed"
                );
                metrics::counter!("llm_requests_total", "status" => "ok").increment(1);
                metrics::counter!("llm_tokens_total").increment(selection.total_tokens());
                selection
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    tools_offered = tools.len(),
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Tool selection failed"
                );
                metrics::counter!("llm_requests_total", "status" => "error").increment(1);
                Selection::failed(e.to_string())
            }
        }
    }
}
