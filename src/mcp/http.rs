//! Streamable-HTTP transport for MCP servers.
//!
//! Every JSON-RPC request is a POST. The server may answer with a plain
//! JSON body or with an SSE body that interleaves notifications and
//! server-initiated requests (elicitation) before the final response.
//! Elicitation requests are forwarded on a channel so the caller can
//! collect user input while the originating tool call stays in flight.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::events::{EventBus, ChatEvent, Level};

use super::{ElicitRequest, ElicitResponse, McpClient, ToolDef, ToolResult};

const PROTOCOL_VERSION: &str = "2025-06-18";
const SESSION_HEADER: &str = "mcp-session-id";

pub struct HttpMcpClient {
    client: reqwest::Client,
    server_url: String,
    session_id: RwLock<Option<String>>,
    next_id: AtomicI64,
    bus: EventBus,
    elicit_tx: mpsc::UnboundedSender<ElicitRequest>,
}

impl HttpMcpClient {
    /// Connect and run the initialize handshake. Returns the client and
    /// the receiver for server-initiated elicitation requests.
    pub async fn connect(
        server_url: impl Into<String>,
        bus: EventBus,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ElicitRequest>)> {
        let (elicit_tx, elicit_rx) = mpsc::unbounded_channel();
        let client = HttpMcpClient {
            client: reqwest::Client::new(),
            server_url: server_url.into(),
            session_id: RwLock::new(None),
            next_id: AtomicI64::new(1),
            bus,
            elicit_tx,
        };
        client.initialize().await?;
        Ok((client, elicit_rx))
    }

    /// Session id assigned by the server during initialize, if any.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().ok().and_then(|guard| guard.clone())
    }

    async fn initialize(&self) -> Result<()> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"elicitation": {}},
            "clientInfo": {"name": "toolchat", "version": env!("CARGO_PKG_VERSION")},
        });
        let result = self.request("initialize", params).await?;

        if let Some(instructions) = result.get("instructions").and_then(Value::as_str) {
            if !instructions.trim().is_empty() {
                self.bus.emit(ChatEvent::ServerInstructions {
                    text: instructions.to_string(),
                });
            }
        }

        self.post(&json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized",
        }))
        .await?;
        Ok(())
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response> {
        let mut request = self
            .client
            .post(&self.server_url)
            .header("accept", "application/json, text/event-stream")
            .json(body);
        if let Some(session) = self.session_id() {
            request = request.header(SESSION_HEADER, session);
        }
        let response = request.send().await.context("MCP server unreachable")?;

        let status = response.status();
        if !status.is_success() && status.as_u16() != 202 {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("MCP server returned {status}: {detail}");
        }

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            if let Ok(mut guard) = self.session_id.write() {
                *guard = Some(session.to_string());
            }
        }
        Ok(response)
    }

    /// Issue a JSON-RPC request and wait for the matching response,
    /// dispatching anything else the server sends in between.
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let response = self.post(&body).await?;

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.starts_with("text/event-stream") {
            self.scan_stream(response, id).await
        } else {
            let envelope: Value = response
                .json()
                .await
                .context("invalid JSON-RPC response body")?;
            unwrap_envelope(envelope, id)
        }
    }

    /// Read an SSE body until the response with our id arrives.
    async fn scan_stream(&self, response: reqwest::Response, id: i64) -> Result<Value> {
        let mut events = response.bytes_stream().eventsource();
        while let Some(event) = events.next().await {
            let event = event.map_err(|err| anyhow!("MCP stream error: {err}"))?;
            let message: Value = match serde_json::from_str(&event.data) {
                Ok(message) => message,
                Err(_) => continue,
            };
            if message.get("id").and_then(Value::as_i64) == Some(id)
                && message.get("method").is_none()
            {
                return unwrap_envelope(message, id);
            }
            self.dispatch(message);
        }
        anyhow::bail!("MCP stream ended before response to request {id}")
    }

    /// Handle a server-initiated message seen while waiting for a
    /// response.
    fn dispatch(&self, message: Value) {
        let method = message
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default();
        match method {
            "elicitation/create" => {
                let Some(id) = message.get("id").cloned() else {
                    return;
                };
                let params = message.get("params").cloned().unwrap_or(Value::Null);
                let request = ElicitRequest {
                    id,
                    message: params
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    schema: params
                        .get("requestedSchema")
                        .cloned()
                        .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
                };
                let _ = self.elicit_tx.send(request);
            }
            "notifications/message" => {
                let params = message.get("params").cloned().unwrap_or(Value::Null);
                let level = match params.get("level").and_then(Value::as_str) {
                    Some("error") | Some("critical") => Level::Error,
                    Some("warning") => Level::Warning,
                    _ => Level::Info,
                };
                let text = params
                    .get("data")
                    .map(|data| match data.as_str() {
                        Some(text) => text.to_string(),
                        None => data.to_string(),
                    })
                    .unwrap_or_default();
                if !text.is_empty() {
                    self.bus.notify(level, text);
                }
            }
            _ => {}
        }
    }
}

fn unwrap_envelope(envelope: Value, id: i64) -> Result<Value> {
    if let Some(error) = envelope.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        anyhow::bail!("MCP request {id} failed: {message}");
    }
    envelope
        .get("result")
        .cloned()
        .ok_or_else(|| anyhow!("MCP response {id} missing result"))
}

#[async_trait]
impl McpClient for HttpMcpClient {
    async fn list_tools(&self) -> Result<Vec<ToolDef>> {
        let result = self.request("tools/list", json!({})).await?;
        let tools = result.get("tools").cloned().unwrap_or(Value::Array(vec![]));
        serde_json::from_value(tools).context("malformed tools/list result")
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult> {
        let params = json!({
            "name": name,
            "arguments": arguments,
            "_meta": {"progressToken": Uuid::new_v4().to_string()},
        });
        let result = self.request("tools/call", params).await?;
        serde_json::from_value(result).context("malformed tools/call result")
    }

    async fn submit_elicit_response(&self, response: ElicitResponse) -> Result<()> {
        let mut result = json!({"action": response.action.as_str()});
        if let Some(content) = response.content {
            result["content"] = content;
        }
        self.post(&json!({
            "jsonrpc": "2.0",
            "id": response.id,
            "result": result,
        }))
        .await?;
        Ok(())
    }
}
