//! Key/value persistence for session state.
//!
//! Remembers the MCP server URL, the API token, and the server-assigned
//! session id across runs in a small JSON file (`~/.toolchat/session.json`).

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::PathBuf;

pub const KEY_MCP_SERVER: &str = "mcp_server";
pub const KEY_API_TOKEN: &str = "open_ai_token";
pub const KEY_SESSION_ID: &str = "mcp_session_id";

/// Flat string-to-string store backed by a JSON file. Writes go
/// straight to disk; there is no in-memory caching to invalidate.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Store at the default location under the user config directory.
    pub fn open_default() -> Result<Self> {
        let dir = crate::config::Config::config_dir()
            .context("cannot determine home directory")?;
        Ok(SessionStore::at(dir.join("session.json")))
    }

    pub fn at(path: PathBuf) -> Self {
        SessionStore { path }
    }

    fn read_map(&self) -> Map<String, Value> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|content| serde_json::from_str::<Value>(&content).ok())
            .and_then(|value| match value {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.read_map()
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.read_map();
        map.insert(key.to_string(), Value::String(value.to_string()));
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(&Value::Object(map))?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let mut map = self.read_map();
        if map.remove(key).is_some() {
            let content = serde_json::to_string_pretty(&Value::Object(map))?;
            std::fs::write(&self.path, content)
                .with_context(|| format!("failed to write {}", self.path.display()))?;
        }
        Ok(())
    }
}
