//! Streaming client for OpenAI-compatible chat completion endpoints.

use anyhow::{Context, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ChatModel, ChatRequest, ChatStream, ChunkDelta, ToolCallFragment};

/// OpenAI-compatible backend. Works against api.openai.com and any
/// server that speaks the same chat-completions SSE protocol.
pub struct OpenAiModel {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl OpenAiModel {
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        OpenAiModel {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn request_body(request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": true,
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.clone());
            body["tool_choice"] = json!("auto");
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallFragment>,
}

#[async_trait]
impl ChatModel for OpenAiModel {
    async fn stream(&self, request: ChatRequest) -> Result<ChatStream> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .context("chat completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("chat completion returned {status}: {detail}");
        }

        let mut events = response.bytes_stream().eventsource();
        let stream = async_stream::stream! {
            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        yield Err(anyhow::anyhow!("stream error: {err}"));
                        break;
                    }
                };
                if event.data.trim() == "[DONE]" {
                    break;
                }
                let chunk: StreamChunk = match serde_json::from_str(&event.data) {
                    Ok(chunk) => chunk,
                    // Skip keep-alives and vendor extensions we don't model.
                    Err(_) => continue,
                };
                for choice in chunk.choices {
                    yield Ok(ChunkDelta {
                        content: choice.delta.content,
                        tool_calls: choice.delta.tool_calls,
                        finish_reason: choice.finish_reason,
                    });
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn test_request_body_includes_tools_when_present() {
        let request = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![json!({"role": "user", "content": "hi"})],
            tools: vec![json!({"type": "function"})],
            temperature: 0.0,
            max_tokens: 512,
        };
        let body = OpenAiModel::request_body(&request);
        assert_eq!(body["stream"], json!(true));
        assert_eq!(body["tool_choice"], json!("auto"));
        assert_eq!(body["tools"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn test_request_body_omits_tools_when_empty() {
        let request = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![],
            tools: vec![],
            temperature: 0.0,
            max_tokens: 512,
        };
        let body = OpenAiModel::request_body(&request);
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let model = OpenAiModel::new("https://api.openai.com/v1/", SecretString::from("k"));
        assert_eq!(model.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_chunk_parsing() {
        let data = r#"{"choices":[{"delta":{"content":"Hi"},"finish_reason":null}]}"#;
        let chunk: StreamChunk = serde_json::from_str(data).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hi"));
    }
}
