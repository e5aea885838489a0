//! MCP (Model Context Protocol) client support for connecting to tool servers.

pub mod http;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool definition from an MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// JSON Schema for tool input parameters.
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Value,
}

/// One content block in a tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

/// Result of a tool invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolResult {
    #[serde(default)]
    pub content: Vec<ToolContent>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

impl ToolResult {
    /// Concatenated text blocks, one per line.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ToolContent::Text { text } => Some(text.as_str()),
                ToolContent::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A server-initiated request for structured user input, delivered
/// while a tool call is in flight.
#[derive(Debug, Clone)]
pub struct ElicitRequest {
    /// JSON-RPC id to echo back in the response.
    pub id: Value,
    pub message: String,
    /// JSON Schema describing the requested fields.
    pub schema: Value,
}

/// User verdict on an elicitation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElicitAction {
    Accept,
    Decline,
    Cancel,
}

impl ElicitAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElicitAction::Accept => "accept",
            ElicitAction::Decline => "decline",
            ElicitAction::Cancel => "cancel",
        }
    }
}

/// Response to an [`ElicitRequest`]. Content is only sent on accept.
#[derive(Debug, Clone)]
pub struct ElicitResponse {
    pub id: Value,
    pub action: ElicitAction,
    pub content: Option<Value>,
}

/// Client side of an MCP connection.
#[async_trait]
pub trait McpClient: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolDef>>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult>;

    /// Deliver the user's answer to a pending elicitation request.
    async fn submit_elicit_response(&self, response: ElicitResponse) -> Result<()>;
}
