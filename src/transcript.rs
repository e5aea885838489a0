//! Chat transcript.
//!
//! Append-only list of user/bot messages. The single permitted mutation
//! beyond append is updating the trailing bot message's content while a
//! model stream is in flight, so incremental tokens render as they
//! arrive.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::layout::Layout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Bot,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub layouts: Vec<Layout>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>, layouts: Vec<Layout>) -> Self {
        Message {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            layouts,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Transcript::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::new(Role::User, content, Vec::new()));
    }

    pub fn push_bot(&mut self, content: impl Into<String>) {
        self.messages.push(Message::new(Role::Bot, content, Vec::new()));
    }

    pub fn push_bot_with_layouts(&mut self, content: impl Into<String>, layouts: Vec<Layout>) {
        self.messages.push(Message::new(Role::Bot, content, layouts));
    }

    /// Replace the trailing bot message's content (streaming update).
    /// No-op when the transcript is empty or ends with a user message.
    pub fn set_last_bot_content(&mut self, content: &str) {
        if let Some(last) = self.messages.last_mut() {
            if last.role == Role::Bot {
                last.content = content.to_string();
            }
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}
