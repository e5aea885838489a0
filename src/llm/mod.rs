//! Chat model abstraction.
//!
//! The agent loop talks to a [`ChatModel`] trait object and consumes a
//! stream of [`ChunkDelta`]s. Deltas carry partial content and partial
//! tool-call fragments; [`StreamedResponse`] folds them back into a
//! complete assistant turn.

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use serde::Deserialize;
use serde_json::Value;
use std::pin::Pin;

pub mod openai;

/// A single chat completion request. Messages use the OpenAI wire shape
/// directly since tool-call records have vendor-specific fields anyway.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Value>,
    /// Tool definitions in OpenAI function format, empty when no tools
    /// are available.
    pub tools: Vec<Value>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A fully accumulated tool call requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    /// Raw JSON-encoded arguments as sent by the model.
    pub arguments: String,
}

impl ToolCallRequest {
    /// Parse the arguments string, treating empty or malformed JSON as
    /// an empty object so a confused model does not abort the turn.
    pub fn parsed_arguments(&self) -> Value {
        serde_json::from_str(&self.arguments).unwrap_or_else(|_| Value::Object(Default::default()))
    }
}

/// Partial tool call as it arrives over the stream. The first fragment
/// for an index carries the id and name; later fragments append to the
/// arguments string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCallFragment {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: ToolFunctionFragment,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolFunctionFragment {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// One parsed streaming chunk.
#[derive(Debug, Clone, Default)]
pub struct ChunkDelta {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallFragment>,
    pub finish_reason: Option<String>,
}

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChunkDelta>> + Send>>;

/// Accumulates stream deltas into a complete assistant response.
#[derive(Debug, Default)]
pub struct StreamedResponse {
    pub content: String,
    calls: Vec<(String, String, String)>,
    pub finish_reason: Option<String>,
}

impl StreamedResponse {
    pub fn new() -> Self {
        StreamedResponse::default()
    }

    pub fn apply(&mut self, delta: &ChunkDelta) {
        if let Some(content) = &delta.content {
            self.content.push_str(content);
        }
        for fragment in &delta.tool_calls {
            while self.calls.len() <= fragment.index {
                self.calls.push((String::new(), String::new(), String::new()));
            }
            let slot = &mut self.calls[fragment.index];
            if let Some(id) = &fragment.id {
                slot.0 = id.clone();
            }
            if let Some(name) = &fragment.function.name {
                slot.1.push_str(name);
            }
            if let Some(arguments) = &fragment.function.arguments {
                slot.2.push_str(arguments);
            }
        }
        if delta.finish_reason.is_some() {
            self.finish_reason = delta.finish_reason.clone();
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.calls.is_empty()
    }

    pub fn tool_calls(&self) -> Vec<ToolCallRequest> {
        self.calls
            .iter()
            .map(|(id, name, arguments)| ToolCallRequest {
                id: id.clone(),
                name: name.clone(),
                arguments: arguments.clone(),
            })
            .collect()
    }
}

/// Streaming chat completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn stream(&self, request: ChatRequest) -> Result<ChatStream>;
}
