//! Conversion of MCP tool definitions into the OpenAI function format.

use serde_json::{json, Value};

use crate::mcp::ToolDef;

/// Build the OpenAI-compatible function schema for a tool.
///
/// Tools without a description get a generic one derived from the tool
/// name so the model still has something to route on.
pub fn to_openai_schema(tool: &ToolDef) -> Value {
    let description = tool
        .description
        .clone()
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| format!("user questions on {}", tool.name));

    let parameters = if tool.input_schema.is_object() {
        tool.input_schema.clone()
    } else {
        json!({"type": "object", "properties": {}})
    };

    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": description,
            "parameters": parameters,
        }
    })
}

/// Convert a full tool list for a chat request.
pub fn to_openai_schemas(tools: &[ToolDef]) -> Vec<Value> {
    tools.iter().map(to_openai_schema).collect()
}
