//! Event fan-out between the core and the render layer.
//!
//! The agent loop and the MCP client never write to stdout themselves;
//! they emit typed events on a shared [`EventBus`] and the caller decides
//! how to render them. The core only needs "something changed"
//! notifications, not a full reactive framework.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Severity for user-facing notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

/// Events emitted by the core.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// The transcript gained or changed a message; re-render.
    TranscriptChanged,
    /// A streamed content delta, in arrival order.
    StreamDelta { text: String },
    /// A complete bot transcript entry that was not streamed, such as an
    /// interpreted tool result or a cancellation notice.
    BotMessage {
        text: String,
        layouts: Vec<crate::layout::Layout>,
    },
    /// Position within the current tool-call batch. `(0, 0)` marks loop
    /// exit on every path (success, failure, cancellation).
    ToolProgress { current: usize, total: usize },
    /// Connection and server-side notices.
    Notification { level: Level, message: String },
    /// The server published usage instructions at connect time.
    ServerInstructions { text: String },
}

type Subscriber = Box<dyn Fn(&ChatEvent) + Send + Sync>;

/// Subscriber fan-out with a monotonically increasing sequence counter.
/// Cloning shares the subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus::default()
    }

    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&ChatEvent) + Send + Sync + 'static,
    {
        if let Ok(mut subs) = self.subscribers.write() {
            subs.push(Box::new(handler));
        }
    }

    pub fn emit(&self, event: ChatEvent) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        if let Ok(subs) = self.subscribers.read() {
            for handler in subs.iter() {
                handler(&event);
            }
        }
    }

    pub fn notify(&self, level: Level, message: impl Into<String>) {
        self.emit(ChatEvent::Notification {
            level,
            message: message.into(),
        });
    }

    /// Number of events emitted so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_subscribe_and_emit() {
        let bus = EventBus::new();
        let seen: Arc<Mutex<Vec<ChatEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

        bus.emit(ChatEvent::TranscriptChanged);
        bus.notify(Level::Info, "connected");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], ChatEvent::TranscriptChanged);
        assert_eq!(bus.sequence(), 2);
    }

    #[test]
    fn test_clone_shares_subscribers() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));
        let sink = count.clone();
        bus.subscribe(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });
        let clone = bus.clone();
        clone.emit(ChatEvent::TranscriptChanged);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
