//! Core agent loop implementation.
//!
//! Drives one conversation turn: stream the model response, execute any
//! requested tool calls sequentially through the MCP client, feed the
//! results back into the model-facing history, and repeat until the
//! model stops calling tools, the iteration cap is hit, a tool name
//! repeats, or the turn is cancelled.

use anyhow::Result;
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

use crate::events::{ChatEvent, EventBus, Level};
use crate::interpret;
use crate::llm::{ChatModel, ChatRequest, StreamedResponse, ToolCallRequest};
use crate::mcp::McpClient;
use crate::transcript::Transcript;

use super::CancelToken;

/// Maximum model round trips per user turn.
pub const DEFAULT_MAX_ITERATIONS: usize = 20;

/// Transcript entry appended when a turn is cancelled.
pub const CANCELLED_MESSAGE: &str = "Operation cancelled by user.";

/// Transcript entry appended when a turn fails unexpectedly.
pub const FAILURE_MESSAGE: &str = "Sorry, something went wrong while processing your request.";

/// Configuration for the agent loop.
#[derive(Debug, Clone)]
pub struct AgentLoopConfig {
    pub max_iterations: usize,
    pub model: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            model: "gpt-4o-mini".to_string(),
            system_prompt: String::new(),
            temperature: 0.0,
            max_tokens: 512,
        }
    }
}

impl AgentLoopConfig {
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }
}

/// Conversation state that outlives a single turn. History accumulates
/// across turns; per-turn bookkeeping lives in the loop itself.
#[derive(Default)]
pub struct AgentSession {
    pub transcript: Transcript,
    history: Vec<Value>,
}

impl AgentSession {
    pub fn new() -> Self {
        AgentSession::default()
    }

    pub fn history(&self) -> &[Value] {
        &self.history
    }
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Done,
    Cancelled,
    Failed,
}

/// Result of a single agent turn.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub outcome: TurnOutcome,
    pub iterations: usize,
    pub tools_invoked: usize,
}

pub struct Agent {
    model: Arc<dyn ChatModel>,
    mcp: Arc<dyn McpClient>,
    /// Tool definitions in the model's function format.
    tools: Vec<Value>,
    bus: EventBus,
    cancel: CancelToken,
    config: AgentLoopConfig,
}

/// Per-turn loop bookkeeping.
struct TurnState {
    used_tools: HashSet<String>,
    iterations: usize,
    tools_invoked: usize,
}

impl Agent {
    pub fn new(
        model: Arc<dyn ChatModel>,
        mcp: Arc<dyn McpClient>,
        tools: Vec<Value>,
        bus: EventBus,
        cancel: CancelToken,
        config: AgentLoopConfig,
    ) -> Self {
        Agent {
            model,
            mcp,
            tools,
            bus,
            cancel,
            config,
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run one user turn to completion. Failures never propagate; they
    /// become transcript entries and a [`TurnOutcome::Failed`] result.
    pub async fn run_turn(&self, session: &mut AgentSession, user_input: &str) -> TurnResult {
        session.transcript.push_user(user_input);
        self.bus.emit(ChatEvent::TranscriptChanged);
        session
            .history
            .push(json!({"role": "user", "content": user_input}));

        let mut state = TurnState {
            used_tools: HashSet::new(),
            iterations: 0,
            tools_invoked: 0,
        };

        let outcome = match self.drive(session, &mut state).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.bus.notify(Level::Error, format!("turn failed: {err:#}"));
                session.transcript.push_bot(FAILURE_MESSAGE);
                self.bus.emit(ChatEvent::BotMessage {
                    text: FAILURE_MESSAGE.to_string(),
                    layouts: Vec::new(),
                });
                self.bus.emit(ChatEvent::TranscriptChanged);
                TurnOutcome::Failed
            }
        };

        // Progress always returns to idle, whatever path exited the loop.
        self.bus.emit(ChatEvent::ToolProgress {
            current: 0,
            total: 0,
        });

        TurnResult {
            outcome,
            iterations: state.iterations,
            tools_invoked: state.tools_invoked,
        }
    }

    async fn drive(&self, session: &mut AgentSession, state: &mut TurnState) -> Result<TurnOutcome> {
        while state.iterations < self.config.max_iterations {
            if self.cancel.is_cancelled() {
                return Ok(self.exit_cancelled(session));
            }
            state.iterations += 1;

            let response = match self.stream_response(session).await? {
                Some(response) => response,
                // Cancelled mid-stream.
                None => return Ok(self.exit_cancelled(session)),
            };

            if !response.has_tool_calls() {
                session
                    .history
                    .push(json!({"role": "assistant", "content": response.content}));
                return Ok(TurnOutcome::Done);
            }

            let calls = response.tool_calls();
            let total = calls.len();
            // Each call's request record is committed to history together
            // with its output. An early exit (guard, failure, cancel)
            // must never leave a declared call without a matching
            // `role: "tool"` answer, or every later request in the
            // session is rejected by the backend.
            let mut answered: Vec<(ToolCallRequest, String)> = Vec::new();
            let mut early_exit = None;

            for (index, call) in calls.iter().enumerate() {
                if self.cancel.is_cancelled() {
                    early_exit = Some(self.exit_cancelled(session));
                    break;
                }
                // Repeated-tool guard: a name seen earlier this turn ends
                // the loop instead of ping-ponging forever.
                if !state.used_tools.insert(call.name.clone()) {
                    early_exit = Some(TurnOutcome::Done);
                    break;
                }
                self.bus.emit(ChatEvent::ToolProgress {
                    current: index + 1,
                    total,
                });
                state.tools_invoked += 1;

                match self.invoke_tool(session, call).await {
                    Ok(raw) => answered.push((call.clone(), raw)),
                    Err(err) => {
                        let notice = format!("Tool '{}' failed: {err:#}", call.name);
                        self.bus.notify(Level::Error, notice.clone());
                        session.transcript.push_bot(&notice);
                        self.bus.emit(ChatEvent::BotMessage {
                            text: notice,
                            layouts: Vec::new(),
                        });
                        self.bus.emit(ChatEvent::TranscriptChanged);
                        early_exit = Some(TurnOutcome::Failed);
                        break;
                    }
                }
            }

            self.record_batch(session, &response.content, &answered);
            if let Some(outcome) = early_exit {
                return Ok(outcome);
            }
        }
        Ok(TurnOutcome::Done)
    }

    /// Append the batch to the model-facing history: one assistant record
    /// declaring exactly the calls that produced outputs, followed by one
    /// tool record per output. Calls skipped by an early exit are omitted
    /// so declared and answered counts always match.
    fn record_batch(
        &self,
        session: &mut AgentSession,
        content: &str,
        answered: &[(ToolCallRequest, String)],
    ) {
        if answered.is_empty() {
            if !content.is_empty() {
                session
                    .history
                    .push(json!({"role": "assistant", "content": content}));
            }
            return;
        }
        session.history.push(json!({
            "role": "assistant",
            "content": content,
            "tool_calls": answered.iter().map(|(call, _)| json!({
                "id": call.id,
                "type": "function",
                "function": {"name": call.name, "arguments": call.arguments},
            })).collect::<Vec<_>>(),
        }));
        for (call, raw) in answered {
            session.history.push(json!({
                "role": "tool",
                "tool_call_id": call.id,
                "content": raw,
            }));
        }
    }

    /// Stream one model response, applying content deltas to the
    /// transcript as they arrive. Returns `None` on cancellation.
    async fn stream_response(&self, session: &mut AgentSession) -> Result<Option<StreamedResponse>> {
        let mut messages = Vec::with_capacity(session.history.len() + 1);
        if !self.config.system_prompt.is_empty() {
            messages.push(json!({"role": "system", "content": self.config.system_prompt}));
        }
        messages.extend(session.history.iter().cloned());

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages,
            tools: self.tools.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let mut stream = self.model.stream(request).await?;
        let mut response = StreamedResponse::new();
        let mut bot_started = false;

        loop {
            let chunk = tokio::select! {
                // Dropping the stream aborts the in-flight request.
                _ = self.cancel.cancelled() => return Ok(None),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let delta = chunk?;
            response.apply(&delta);

            if let Some(text) = &delta.content {
                if !text.is_empty() {
                    if !bot_started {
                        session.transcript.push_bot("");
                        bot_started = true;
                    }
                    self.bus.emit(ChatEvent::StreamDelta { text: text.clone() });
                    session.transcript.set_last_bot_content(&response.content);
                    self.bus.emit(ChatEvent::TranscriptChanged);
                }
            }
        }
        Ok(Some(response))
    }

    /// Execute one tool call, append its interpreted result to the
    /// transcript, and return the raw output for the history record.
    async fn invoke_tool(&self, session: &mut AgentSession, call: &ToolCallRequest) -> Result<String> {
        let result = self
            .mcp
            .call_tool(&call.name, call.parsed_arguments())
            .await?;
        let raw = result.text();
        if result.is_error {
            anyhow::bail!("{}", if raw.is_empty() { "tool reported an error" } else { raw.as_str() });
        }

        let interpreted = interpret::interpret(&raw);
        session
            .transcript
            .push_bot_with_layouts(&interpreted.display_text, interpreted.layouts.clone());
        self.bus.emit(ChatEvent::BotMessage {
            text: interpreted.display_text,
            layouts: interpreted.layouts,
        });
        self.bus.emit(ChatEvent::TranscriptChanged);
        Ok(raw)
    }

    fn exit_cancelled(&self, session: &mut AgentSession) -> TurnOutcome {
        session.transcript.push_bot(CANCELLED_MESSAGE);
        self.bus.emit(ChatEvent::BotMessage {
            text: CANCELLED_MESSAGE.to_string(),
            layouts: Vec::new(),
        });
        self.bus.emit(ChatEvent::TranscriptChanged);
        TurnOutcome::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatStream, ChunkDelta, ToolCallFragment, ToolFunctionFragment};
    use crate::mcp::{ElicitResponse, ToolContent, ToolDef, ToolResult};
    use crate::transcript::Role;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted model: each call to `stream` pops the next canned list
    /// of deltas.
    struct FakeChatModel {
        scripts: Mutex<Vec<Vec<ChunkDelta>>>,
    }

    impl FakeChatModel {
        fn new(scripts: Vec<Vec<ChunkDelta>>) -> Arc<Self> {
            Arc::new(FakeChatModel {
                scripts: Mutex::new(scripts),
            })
        }
    }

    #[async_trait]
    impl ChatModel for FakeChatModel {
        async fn stream(&self, _request: ChatRequest) -> Result<ChatStream> {
            let deltas = {
                let mut scripts = self.scripts.lock().unwrap();
                if scripts.is_empty() {
                    vec![]
                } else {
                    scripts.remove(0)
                }
            };
            Ok(Box::pin(futures::stream::iter(
                deltas.into_iter().map(Ok),
            )))
        }
    }

    struct FakeMcp {
        results: Mutex<Vec<Result<ToolResult>>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeMcp {
        fn new(results: Vec<Result<ToolResult>>) -> Arc<Self> {
            Arc::new(FakeMcp {
                results: Mutex::new(results),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn text_result(text: &str) -> ToolResult {
            ToolResult {
                content: vec![ToolContent::Text {
                    text: text.to_string(),
                }],
                is_error: false,
            }
        }
    }

    #[async_trait]
    impl McpClient for FakeMcp {
        async fn list_tools(&self) -> Result<Vec<ToolDef>> {
            Ok(vec![])
        }

        async fn call_tool(&self, name: &str, _arguments: Value) -> Result<ToolResult> {
            self.calls.lock().unwrap().push(name.to_string());
            let mut results = self.results.lock().unwrap();
            if results.is_empty() {
                Ok(FakeMcp::text_result("ok"))
            } else {
                results.remove(0)
            }
        }

        async fn submit_elicit_response(&self, _response: ElicitResponse) -> Result<()> {
            Ok(())
        }
    }

    fn content_delta(text: &str) -> ChunkDelta {
        ChunkDelta {
            content: Some(text.to_string()),
            ..Default::default()
        }
    }

    fn tool_delta(id: &str, name: &str, arguments: &str) -> ChunkDelta {
        ChunkDelta {
            tool_calls: vec![ToolCallFragment {
                index: 0,
                id: Some(id.to_string()),
                function: ToolFunctionFragment {
                    name: Some(name.to_string()),
                    arguments: Some(arguments.to_string()),
                },
            }],
            finish_reason: Some("tool_calls".to_string()),
            ..Default::default()
        }
    }

    fn agent(model: Arc<dyn ChatModel>, mcp: Arc<dyn McpClient>) -> Agent {
        Agent::new(
            model,
            mcp,
            vec![],
            EventBus::new(),
            CancelToken::new(),
            AgentLoopConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_content_only_turn_terminates_in_one_iteration() {
        let model = FakeChatModel::new(vec![vec![content_delta("4")]]);
        let mcp = FakeMcp::new(vec![]);
        let agent = agent(model, mcp);
        let mut session = AgentSession::new();

        let result = agent.run_turn(&mut session, "What is 2+2?").await;

        assert_eq!(result.outcome, TurnOutcome::Done);
        assert_eq!(result.iterations, 1);
        let messages = session.transcript.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "What is 2+2?");
        assert_eq!(messages[1].role, Role::Bot);
        assert_eq!(messages[1].content, "4");
    }

    #[tokio::test]
    async fn test_tool_call_feeds_result_back_into_history() {
        let model = FakeChatModel::new(vec![
            vec![tool_delta("call_1", "get_weather", r#"{"city":"Paris"}"#)],
            vec![content_delta("It is 18 degrees.")],
        ]);
        let mcp = FakeMcp::new(vec![Ok(FakeMcp::text_result(r#"{"temp":18}"#))]);
        let calls = mcp.clone();
        let agent = agent(model, mcp);
        let mut session = AgentSession::new();

        let result = agent.run_turn(&mut session, "Weather in Paris?").await;

        assert_eq!(result.outcome, TurnOutcome::Done);
        assert_eq!(result.tools_invoked, 1);
        assert_eq!(*calls.calls.lock().unwrap(), vec!["get_weather"]);

        // Tool output without a layouts key renders as a code block.
        let messages = session.transcript.messages();
        assert!(messages
            .iter()
            .any(|message| message.content.starts_with("```json")));

        // History carries the call and its output before the second
        // model round trip.
        let history = session.history();
        let assistant = history
            .iter()
            .find(|message| message.get("tool_calls").is_some())
            .unwrap();
        assert_eq!(
            assistant["tool_calls"][0]["function"]["name"],
            json!("get_weather")
        );
        let tool_output = history
            .iter()
            .find(|message| message["role"] == json!("tool"))
            .unwrap();
        assert_eq!(tool_output["tool_call_id"], json!("call_1"));
        assert_eq!(tool_output["content"], json!(r#"{"temp":18}"#));
    }

    fn declared_and_answered(history: &[Value]) -> (usize, usize) {
        let declared = history
            .iter()
            .filter_map(|message| message.get("tool_calls"))
            .filter_map(Value::as_array)
            .map(Vec::len)
            .sum();
        let answered = history
            .iter()
            .filter(|message| message["role"] == json!("tool"))
            .count();
        (declared, answered)
    }

    #[tokio::test]
    async fn test_guard_exit_keeps_history_balanced() {
        // One batch requesting the same tool twice: the second call is
        // skipped by the guard and must not be declared in history.
        let model = FakeChatModel::new(vec![vec![ChunkDelta {
            tool_calls: vec![
                ToolCallFragment {
                    index: 0,
                    id: Some("call_1".to_string()),
                    function: ToolFunctionFragment {
                        name: Some("get_weather".to_string()),
                        arguments: Some("{}".to_string()),
                    },
                },
                ToolCallFragment {
                    index: 1,
                    id: Some("call_2".to_string()),
                    function: ToolFunctionFragment {
                        name: Some("get_weather".to_string()),
                        arguments: Some("{}".to_string()),
                    },
                },
            ],
            finish_reason: Some("tool_calls".to_string()),
            ..Default::default()
        }]]);
        let mcp = FakeMcp::new(vec![]);
        let agent = agent(model, mcp);
        let mut session = AgentSession::new();

        let result = agent.run_turn(&mut session, "loop?").await;

        assert_eq!(result.outcome, TurnOutcome::Done);
        let (declared, answered) = declared_and_answered(session.history());
        assert_eq!(declared, 1);
        assert_eq!(answered, 1);
    }

    #[tokio::test]
    async fn test_failed_tool_is_not_declared_in_history() {
        let model = FakeChatModel::new(vec![vec![tool_delta(
            "call_1",
            "create_ticket",
            "{}",
        )]]);
        let mcp = FakeMcp::new(vec![Err(anyhow::anyhow!("connection refused"))]);
        let agent = agent(model, mcp);
        let mut session = AgentSession::new();

        let result = agent.run_turn(&mut session, "file a ticket").await;

        assert_eq!(result.outcome, TurnOutcome::Failed);
        let (declared, answered) = declared_and_answered(session.history());
        assert_eq!(declared, 0);
        assert_eq!(answered, 0);
    }

    #[tokio::test]
    async fn test_repeated_tool_name_ends_turn_early() {
        let model = FakeChatModel::new(vec![
            vec![tool_delta("call_1", "get_weather", "{}")],
            vec![tool_delta("call_2", "get_weather", "{}")],
            vec![content_delta("never reached")],
        ]);
        let mcp = FakeMcp::new(vec![]);
        let calls = mcp.clone();
        let agent = agent(model, mcp);
        let mut session = AgentSession::new();

        let result = agent.run_turn(&mut session, "loop?").await;

        assert_eq!(result.outcome, TurnOutcome::Done);
        assert_eq!(calls.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_appends_single_notice() {
        let model = FakeChatModel::new(vec![vec![content_delta("partial")]]);
        let mcp = FakeMcp::new(vec![]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let agent = Agent::new(
            model,
            mcp,
            vec![],
            EventBus::new(),
            cancel,
            AgentLoopConfig::default(),
        );
        let mut session = AgentSession::new();

        let result = agent.run_turn(&mut session, "hi").await;

        assert_eq!(result.outcome, TurnOutcome::Cancelled);
        let messages = session.transcript.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, CANCELLED_MESSAGE);
    }

    #[tokio::test]
    async fn test_mid_stream_cancellation_drops_pending_chunks() {
        // The flag flips between chunks; the in-flight stream still has
        // content queued behind a suspension point that must never reach
        // the transcript.
        struct MidStreamCancelModel {
            cancel: CancelToken,
        }

        #[async_trait]
        impl ChatModel for MidStreamCancelModel {
            async fn stream(&self, _request: ChatRequest) -> Result<ChatStream> {
                let cancel = self.cancel.clone();
                Ok(Box::pin(async_stream::stream! {
                    yield Ok(ChunkDelta {
                        content: Some("partial".to_string()),
                        ..Default::default()
                    });
                    cancel.cancel();
                    futures::future::pending::<()>().await;
                    yield Ok(ChunkDelta {
                        content: Some(" never applied".to_string()),
                        ..Default::default()
                    });
                }))
            }
        }

        let cancel = CancelToken::new();
        let model = Arc::new(MidStreamCancelModel {
            cancel: cancel.clone(),
        });
        let mcp = FakeMcp::new(vec![]);
        let agent = Agent::new(
            model,
            mcp,
            vec![],
            EventBus::new(),
            cancel,
            AgentLoopConfig::default(),
        );
        let mut session = AgentSession::new();

        let result = agent.run_turn(&mut session, "hi").await;

        assert_eq!(result.outcome, TurnOutcome::Cancelled);
        let messages = session.transcript.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].content, "partial");
        assert_eq!(messages[2].content, CANCELLED_MESSAGE);
    }

    #[tokio::test]
    async fn test_tool_failure_names_the_tool_and_stops() {
        let model = FakeChatModel::new(vec![vec![tool_delta(
            "call_1",
            "create_ticket",
            "{}",
        )]]);
        let mcp = FakeMcp::new(vec![Err(anyhow::anyhow!("connection refused"))]);
        let agent = agent(model, mcp);
        let mut session = AgentSession::new();

        let result = agent.run_turn(&mut session, "file a ticket").await;

        assert_eq!(result.outcome, TurnOutcome::Failed);
        let last = session.transcript.last().unwrap();
        assert!(last.content.contains("create_ticket"));
        assert!(last.content.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_iteration_cap_bounds_the_loop() {
        // Every response requests a fresh tool name, so only the cap
        // can stop the loop.
        let scripts: Vec<Vec<ChunkDelta>> = (0..30)
            .map(|i| vec![tool_delta(&format!("call_{i}"), &format!("tool_{i}"), "{}")])
            .collect();
        let model = FakeChatModel::new(scripts);
        let mcp = FakeMcp::new(vec![]);
        let agent = Agent::new(
            model,
            mcp,
            vec![],
            EventBus::new(),
            CancelToken::new(),
            AgentLoopConfig::default().with_max_iterations(3),
        );
        let mut session = AgentSession::new();

        let result = agent.run_turn(&mut session, "go").await;

        assert_eq!(result.outcome, TurnOutcome::Done);
        assert_eq!(result.iterations, 3);
    }

    #[tokio::test]
    async fn test_progress_resets_to_idle_on_exit() {
        let model = FakeChatModel::new(vec![
            vec![tool_delta("call_1", "get_weather", "{}")],
            vec![content_delta("done")],
        ]);
        let mcp = FakeMcp::new(vec![]);
        let bus = EventBus::new();
        let progress: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = progress.clone();
        bus.subscribe(move |event| {
            if let ChatEvent::ToolProgress { current, total } = event {
                sink.lock().unwrap().push((*current, *total));
            }
        });
        let agent = Agent::new(
            model,
            mcp,
            vec![],
            bus,
            CancelToken::new(),
            AgentLoopConfig::default(),
        );
        let mut session = AgentSession::new();

        agent.run_turn(&mut session, "go").await;

        let progress = progress.lock().unwrap();
        assert_eq!(*progress, vec![(1, 1), (0, 0)]);
    }
}
