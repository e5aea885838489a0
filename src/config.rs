//! Application configuration.
//!
//! Loaded from `~/.toolchat/config.toml` and merged over built-in
//! defaults; individual values can be overridden from the CLI.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::agent::DEFAULT_MAX_ITERATIONS;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Use the available tools to \
answer the user's questions. Answer concisely.";

/// LLM backend settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Direct key. Takes priority over `api_key_env`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable holding the key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_tokens() -> u32 {
    512
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            api_key_env: default_api_key_env(),
            model: default_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
        }
    }
}

impl LlmConfig {
    /// Resolve the API key from config or environment.
    pub fn resolve_api_key(&self) -> Result<SecretString> {
        if let Some(key) = &self.api_key {
            return Ok(SecretString::from(key.clone()));
        }
        std::env::var(&self.api_key_env)
            .map(SecretString::from)
            .with_context(|| format!("API key not set; export {} or add api_key to the config", self.api_key_env))
    }
}

/// MCP server settings.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct McpConfig {
    /// Streamable-HTTP endpoint, e.g. `http://localhost:3000/mcp`.
    #[serde(default)]
    pub server_url: Option<String>,
}

/// Agent loop settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            system_prompt: default_system_prompt(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

impl Config {
    /// User config directory (`~/.toolchat`).
    pub fn config_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".toolchat"))
    }

    /// Load `~/.toolchat/config.toml` if present, defaults otherwise.
    pub fn load() -> Result<Self> {
        if let Some(dir) = Self::config_dir() {
            let path = dir.join("config.toml");
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Config::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))?;
        Ok(config)
    }
}
