//! Catalog loading: turns per-server MCP tool definitions into descriptors.
//!
//! The catalog file is a JSON object keyed by server name. Each value is
//! either an array of MCP tool definitions or a full `list_tools` JSON-RPC
//! response (`result.tools`).

use crate::catalog::types::{OperationType, ToolDescriptor};
use crate::error::{AppError, Result};
use serde_json::Value;
use std::collections::HashSet;

/// Maximum number of parameter descriptions folded into the embedding text
const MAX_PARAM_DESCRIPTIONS: usize = 5;

/// Domain vocabulary appended to the embedding text of each server's tools.
const SERVER_KEYWORDS: &[(&str, &str)] = &[
    ("zendesk", "customer support helpdesk ticketing customer service external customers end-users"),
    ("jira", "project management internal issues development bugs tasks sprint agile"),
    ("hubspot", "sales marketing CRM deals leads pipeline revenue"),
    ("pagerduty", "incident response on-call alerts engineering teams escalation"),
    ("datadog", "application monitoring APM logs metrics observability infrastructure"),
    ("confluence", "documentation wiki knowledge base articles pages collaboration"),
    ("m365", "microsoft office email teams sharepoint outlook calendar"),
    ("snowflake", "data warehouse SQL analytics database queries reporting"),
];

/// Parse a catalog document into tool descriptors.
///
/// Malformed tools and duplicate names are logged and skipped. If every tool
/// in a non-empty catalog fails, the catalog is rejected.
pub fn parse_catalog(json: &Value) -> Result<Vec<ToolDescriptor>> {
    let servers = json.as_object().ok_or_else(|| {
        AppError::CatalogError("Expected a JSON object keyed by server name".into())
    })?;

    let mut seen = HashSet::new();
    let mut results = Vec::new();
    let mut total = 0usize;

    for (server_name, server_value) in servers {
        let tools_array = extract_tools_array(server_value).ok_or_else(|| {
            AppError::CatalogError(format!(
                "Server '{}' must map to a tool array or a list_tools response",
                server_name
            ))
        })?;

        for (idx, tool_value) in tools_array.iter().enumerate() {
            total += 1;
            match normalize_tool(tool_value, server_name) {
                Ok(tool) if seen.contains(&tool.name) => {
                    tracing::warn!(
                        server = %server_name,
                        tool = %tool.name,
                        "Skipping duplicate tool name"
                    );
                }
                Ok(tool) => {
                    seen.insert(tool.name.clone());
                    results.push(tool);
                }
                Err(e) => {
                    tracing::warn!(
                        server = %server_name,
                        index = idx,
                        error = %e,
                        "Skipping malformed tool definition"
                    );
                }
            }
        }
    }

    if results.is_empty() && total > 0 {
        return Err(AppError::CatalogError(
            "All tool definitions failed to parse".into(),
        ));
    }

    tracing::debug!(
        total,
        parsed = results.len(),
        servers = servers.len(),
        "Catalog parsed"
    );

    Ok(results)
}

/// Accepts either a bare tool array or a `result.tools` JSON-RPC response.
fn extract_tools_array(value: &Value) -> Option<&Vec<Value>> {
    value.as_array().or_else(|| {
        value
            .get("result")
            .and_then(|r| r.get("tools"))
            .and_then(|t| t.as_array())
    })
}

fn normalize_tool(tool_value: &Value, server_name: &str) -> Result<ToolDescriptor> {
    let name = tool_value
        .get("name")
        .and_then(|v| v.as_str())
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| {
            AppError::CatalogError(format!(
                "Tool missing required 'name' field: {:?}",
                tool_value.get("name")
            ))
        })?;

    let description = tool_value
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    let operation = OperationType::from_catalog(tool_value.get("type").and_then(|v| v.as_str()));

    let input_schema = tool_value
        .get("inputSchema")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({ "type": "object", "properties": {} }));

    let embedding_text =
        build_embedding_text(name, server_name, operation, description, &input_schema);

    Ok(ToolDescriptor {
        name: name.to_string(),
        server: server_name.to_string(),
        operation,
        description: description.to_string(),
        input_schema,
        embedding_text,
    })
}

/// Build the natural-language text that represents a tool in vector space.
///
/// The description alone embeds poorly for short operational queries, so the
/// text is widened with the server's domain, the operation type, parameter
/// descriptions, the action verb and a few keyword expansions.
pub fn build_embedding_text(
    name: &str,
    server: &str,
    operation: OperationType,
    description: &str,
    input_schema: &Value,
) -> String {
    let mut parts: Vec<String> = vec![name.to_string(), description.to_string()];

    if let Some((_, keywords)) = SERVER_KEYWORDS
        .iter()
        .find(|(s, _)| s.eq_ignore_ascii_case(server))
    {
        parts.push(keywords.to_string());
    }

    parts.push(format!("This {} tool performs {} operations.", server, operation));

    parts.extend(
        param_descriptions(input_schema)
            .into_iter()
            .take(MAX_PARAM_DESCRIPTIONS),
    );

    if let Some((_, action)) = name.split_once('.') {
        parts.push(format!("Action: {}", action.replace('_', " ")));
    }

    parts.extend(
        keyword_expansions(name, server, description)
            .into_iter()
            .map(str::to_string),
    );

    parts.join(" ")
}

/// Collect "param: description" pairs, descending one level into object params.
fn param_descriptions(input_schema: &Value) -> Vec<String> {
    let Some(properties) = input_schema.get("properties").and_then(|p| p.as_object()) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for (param_name, info) in properties {
        if let Some(desc) = info.get("description").and_then(|d| d.as_str()) {
            out.push(format!("{}: {}", param_name, desc));
        }
        if let Some(nested) = info.get("properties").and_then(|p| p.as_object()) {
            for (nested_name, nested_info) in nested {
                if let Some(desc) = nested_info.get("description").and_then(|d| d.as_str()) {
                    out.push(format!("{}: {}", nested_name, desc));
                }
            }
        }
    }
    out
}

fn keyword_expansions(name: &str, server: &str, description: &str) -> Vec<&'static str> {
    let name = name.to_lowercase();
    let desc = description.to_lowercase();
    let server = server.to_lowercase();
    let mut out = Vec::new();

    if name.contains("search") {
        out.push("search query filter find lookup retrieve");
    }
    if name.contains("ticket") || desc.contains("ticket") {
        match server.as_str() {
            "zendesk" => out.push("customer tickets support requests customer issues helpdesk"),
            "hubspot" => out.push("service hub sales tickets deals pipeline"),
            _ => {}
        }
    }
    if name.contains("log") {
        out.push("logs logging events errors exceptions");
    }
    if name.contains("incident") || desc.contains("incident") {
        out.push("incident outage critical emergency production issue");
    }
    if name.contains("trace") {
        out.push("tracing spans performance monitoring");
    }
    if desc.contains("performance") {
        out.push("performance metrics latency errors throughput");
    }
    if desc.contains("error") || desc.contains("failure") {
        out.push("error debugging failure investigation troubleshooting");
    }
    if desc.contains("payment") {
        out.push("payment transactions billing financial money");
    }
    if desc.contains("customer") {
        match server.as_str() {
            "zendesk" => out.push("external customers end users support requests"),
            "hubspot" => out.push("leads prospects sales opportunities"),
            _ => {}
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_server_keyed_arrays() {
        let catalog = json!({
            "jira": [{
                "name": "jira.create_issue",
                "description": "Create a new issue.",
                "type": "write",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "summary": { "type": "string", "description": "Issue title" }
                    },
                    "required": ["summary"]
                }
            }],
            "datadog": [{
                "name": "datadog.search_logs",
                "description": "Search application logs for errors.",
                "type": "read"
            }]
        });

        let tools = parse_catalog(&catalog).unwrap();

        assert_eq!(tools.len(), 2);
        let jira = tools.iter().find(|t| t.name == "jira.create_issue").unwrap();
        assert_eq!(jira.server, "jira");
        assert_eq!(jira.operation, OperationType::Write);
        assert!(jira.embedding_text.contains("summary: Issue title"));
        assert!(jira.embedding_text.contains("Action: create issue"));
        assert!(jira.embedding_text.contains("project management"));
    }

    #[test]
    fn test_parse_list_tools_response() {
        let catalog = json!({
            "math": {
                "jsonrpc": "2.0",
                "id": 1,
                "result": {
                    "tools": [{ "name": "calculate_sum", "description": "Add two numbers." }]
                }
            }
        });

        let tools = parse_catalog(&catalog).unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].server, "math");
        assert_eq!(tools[0].operation, OperationType::Read);
        assert_eq!(tools[0].input_schema["type"], "object");
    }

    #[test]
    fn test_non_object_root_is_rejected() {
        assert!(parse_catalog(&json!([])).is_err());
        assert!(parse_catalog(&json!({ "jira": "nope" })).is_err());
    }

    #[test]
    fn test_missing_name_and_duplicates_are_skipped() {
        let catalog = json!({
            "jira": [
                { "description": "No name here" },
                { "name": "jira.get_issue", "description": "First" },
                { "name": "jira.get_issue", "description": "Duplicate" }
            ]
        });

        let tools = parse_catalog(&catalog).unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].description, "First");
    }

    #[test]
    fn test_all_malformed_is_error() {
        let catalog = json!({ "jira": [{ "description": "a" }, { "name": 7 }] });
        let err = parse_catalog(&catalog).unwrap_err();
        assert!(err.to_string().contains("All tool definitions"));
    }

    #[test]
    fn test_empty_catalog_is_allowed() {
        let tools = parse_catalog(&json!({ "jira": [] })).unwrap();
        assert!(tools.is_empty());
    }

    #[test]
    fn test_embedding_text_expansions() {
        let text = build_embedding_text(
            "pagerduty.create_incident",
            "pagerduty",
            OperationType::Write,
            "Open an incident for a payment failure",
            &json!({}),
        );

        assert!(text.starts_with("pagerduty.create_incident Open an incident"));
        assert!(text.contains("This pagerduty tool performs write operations."));
        assert!(text.contains("incident outage critical"));
        assert!(text.contains("payment transactions billing"));
        assert!(text.contains("error debugging failure"));
        assert!(text.contains("on-call alerts"));
    }

    #[test]
    fn test_param_descriptions_include_nested_and_are_capped() {
        let schema = json!({
            "properties": {
                "a": { "description": "alpha" },
                "b": { "description": "beta" },
                "c": {
                    "type": "object",
                    "description": "gamma",
                    "properties": {
                        "c1": { "description": "nested one" },
                        "c2": { "description": "nested two" }
                    }
                },
                "d": { "description": "delta" },
                "e": { "description": "epsilon" }
            }
        });

        let all = param_descriptions(&schema);
        assert!(all.contains(&"c1: nested one".to_string()));
        assert_eq!(all.len(), 7);

        let text = build_embedding_text("x", "y", OperationType::Read, "", &schema);
        assert!(text.contains("c2: nested two"));
        assert!(!text.contains("d: delta"));
    }
}
