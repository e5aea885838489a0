//! Interactive chat CLI over an MCP tool server.

use anyhow::{Context, Result};
use clap::Parser;
use futures::FutureExt;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::Write as _;
use std::sync::Arc;

use secrecy::SecretString;
use toolchat::agent::{Agent, AgentLoopConfig, AgentSession, CancelToken};
use toolchat::config::{Config, LlmConfig};
use toolchat::events::{ChatEvent, EventBus, Level};
use toolchat::form::{self, FieldValue, FormState};
use toolchat::interpret;
use toolchat::layout::Layout;
use toolchat::llm::openai::OpenAiModel;
use toolchat::mcp::http::HttpMcpClient;
use toolchat::mcp::{ElicitAction, ElicitRequest, ElicitResponse, McpClient, ToolDef};
use toolchat::schema::{FieldKind, ScalarType};
use toolchat::storage::{SessionStore, KEY_API_TOKEN, KEY_MCP_SERVER, KEY_SESSION_ID};
use toolchat::toolformat;

#[derive(Parser)]
#[command(name = "toolchat")]
#[command(about = "Chat with an LLM that can call tools on an MCP server")]
struct Args {
    /// MCP server URL (overrides config and the stored value)
    #[arg(short, long)]
    server: Option<String>,

    /// Model name (overrides config)
    #[arg(short, long)]
    model: Option<String>,

    /// Maximum model round trips per turn
    #[arg(long)]
    max_iterations: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = Config::load()?;
    if let Some(model) = args.model {
        config.llm.model = model;
    }
    if let Some(n) = args.max_iterations {
        config.agent.max_iterations = n;
    }

    let store = SessionStore::open_default()?;
    let mut editor = DefaultEditor::new()?;
    if let Some(dir) = Config::config_dir() {
        let _ = editor.load_history(&dir.join("history.txt"));
    }

    let server_url = match args
        .server
        .or_else(|| config.mcp.server_url.clone())
        .or_else(|| store.get(KEY_MCP_SERVER))
    {
        Some(url) => url,
        None => editor
            .readline("MCP server URL: ")
            .context("no MCP server URL provided")?
            .trim()
            .to_string(),
    };
    store.set(KEY_MCP_SERVER, &server_url)?;

    let api_key = {
        let mut prompt = || -> Result<String> { Ok(editor.readline("OpenAI API key: ")?) };
        resolve_api_key(&config.llm, &store, &mut prompt)?
    };

    let bus = EventBus::new();
    bus.subscribe(render_event);

    println!("Connecting to {server_url} ...");
    let (mcp, mut elicit_rx) = HttpMcpClient::connect(&server_url, bus.clone()).await?;
    if let Some(session_id) = mcp.session_id() {
        store.set(KEY_SESSION_ID, &session_id)?;
    }

    let tools = mcp.list_tools().await?;
    println!(
        "Connected. {} tool{} available. Type /help for commands.",
        tools.len(),
        if tools.len() == 1 { "" } else { "s" }
    );

    let mcp = Arc::new(mcp);
    let model = Arc::new(OpenAiModel::new(config.llm.base_url.clone(), api_key));
    let cancel = CancelToken::new();
    let agent = Agent::new(
        model,
        mcp.clone(),
        toolformat::to_openai_schemas(&tools),
        bus,
        cancel.clone(),
        AgentLoopConfig {
            max_iterations: config.agent.max_iterations,
            model: config.llm.model.clone(),
            system_prompt: config.agent.system_prompt.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
        },
    );
    let mut session = AgentSession::new();

    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(line);

        match line {
            "/quit" | "/exit" => break,
            "/help" => {
                println!("/tools          list server tools");
                println!("/test <tool>    fill the tool's form and call it directly");
                println!("/quit           exit");
                continue;
            }
            "/tools" => {
                for tool in &tools {
                    println!(
                        "  {} - {}",
                        tool.name,
                        tool.description.as_deref().unwrap_or("(no description)")
                    );
                }
                continue;
            }
            _ => {}
        }
        if let Some(name) = line.strip_prefix("/test ") {
            if let Err(err) = test_tool(&mut editor, mcp.as_ref(), &tools, name.trim()).await {
                eprintln!("error: {err:#}");
            }
            continue;
        }

        cancel.reset();
        run_turn(&agent, &mut session, mcp.as_ref(), &mut elicit_rx, &cancel, line).await;
        println!();
    }

    if let Some(dir) = Config::config_dir() {
        let _ = editor.save_history(&dir.join("history.txt"));
    }
    Ok(())
}

/// Drive one turn while watching for Ctrl-C and server elicitation
/// requests. Elicitation prompts block the terminal, which is fine: the
/// turn is suspended inside the originating tool call anyway.
async fn run_turn(
    agent: &Agent,
    session: &mut AgentSession,
    mcp: &HttpMcpClient,
    elicit_rx: &mut tokio::sync::mpsc::UnboundedReceiver<ElicitRequest>,
    cancel: &CancelToken,
    input: &str,
) {
    let turn = agent.run_turn(session, input).fuse();
    tokio::pin!(turn);
    loop {
        tokio::select! {
            _ = &mut turn => break,
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
            }
            Some(request) = elicit_rx.recv() => {
                let response = tokio::task::block_in_place(|| prompt_elicitation(&request));
                match response {
                    Ok(response) => {
                        if let Err(err) = mcp.submit_elicit_response(response).await {
                            eprintln!("error: failed to answer server request: {err:#}");
                        }
                    }
                    Err(err) => eprintln!("error: {err:#}"),
                }
            }
        }
    }
}

/// Collect user input for a server elicitation request.
fn prompt_elicitation(request: &ElicitRequest) -> Result<ElicitResponse> {
    println!("\nThe server requests input: {}", request.message);
    let mut editor = DefaultEditor::new()?;
    let verdict = editor.readline("[a]ccept / [d]ecline / [c]ancel: ")?;
    let action = match verdict.trim() {
        "a" | "accept" => ElicitAction::Accept,
        "d" | "decline" => ElicitAction::Decline,
        _ => ElicitAction::Cancel,
    };
    if action != ElicitAction::Accept {
        return Ok(ElicitResponse {
            id: request.id.clone(),
            action,
            content: None,
        });
    }

    let content = fill_form(&mut editor, &request.schema)?;
    println!(
        "Submitting: {}",
        form::validate::mask_sensitive(&content)
    );
    Ok(ElicitResponse {
        id: request.id.clone(),
        action: ElicitAction::Accept,
        content: Some(content),
    })
}

/// Key precedence: config file or environment first, then the token
/// persisted by an earlier run, then an interactive prompt whose answer
/// is stored for next time.
fn resolve_api_key(
    llm: &LlmConfig,
    store: &SessionStore,
    prompt: &mut dyn FnMut() -> Result<String>,
) -> Result<SecretString> {
    if let Ok(key) = llm.resolve_api_key() {
        return Ok(key);
    }
    if let Some(token) = store.get(KEY_API_TOKEN) {
        return Ok(SecretString::from(token));
    }
    let token = prompt()?.trim().to_string();
    if token.is_empty() {
        anyhow::bail!("no API key provided");
    }
    store.set(KEY_API_TOKEN, &token)?;
    Ok(SecretString::from(token))
}

/// Prompt for each schema field until the form validates, then return
/// the submission value.
fn fill_form(editor: &mut DefaultEditor, schema: &serde_json::Value) -> Result<serde_json::Value> {
    let mut read = |prompt: &str| -> Result<String> { Ok(editor.readline(prompt)?) };
    fill_form_with(&mut read, schema)
}

fn fill_form_with(
    read: &mut dyn FnMut(&str) -> Result<String>,
    schema: &serde_json::Value,
) -> Result<serde_json::Value> {
    loop {
        let mut state = form::builder::build(schema);
        prompt_fields(read, &mut state, "")?;

        match form::validate::submit(&state, schema) {
            Ok(value) => return Ok(value),
            Err(errors) => {
                for error in errors {
                    eprintln!("  ! {error}");
                }
                println!("Please try again.");
            }
        }
    }
}

/// Walk the form depth-first, prompting for scalar fields and recursing
/// into nested object forms. Nested field prompts carry a dotted path so
/// the user can tell `address.street` from a top-level `street`.
fn prompt_fields(
    read: &mut dyn FnMut(&str) -> Result<String>,
    state: &mut FormState,
    prefix: &str,
) -> Result<()> {
    for field in &mut state.fields {
        let label = if prefix.is_empty() {
            field.descriptor.name.clone()
        } else {
            format!("{prefix}.{}", field.descriptor.name)
        };
        if let FieldValue::Form(inner) = &mut field.value {
            prompt_fields(read, inner, &label)?;
            continue;
        }
        let FieldKind::Scalar(scalar) = &field.descriptor.kind else {
            // List and row fields keep their seeded value; required ones
            // are seeded non-empty at build time.
            continue;
        };
        let scalar = *scalar;
        let marker = if field.descriptor.required { "*" } else { "" };
        let raw = read(&format!("  {label}{marker} ({scalar:?}): "))?;
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        field.value = FieldValue::Scalar(parse_scalar(raw, scalar));
    }
    Ok(())
}

fn parse_scalar(raw: &str, scalar: ScalarType) -> serde_json::Value {
    match scalar {
        ScalarType::String => serde_json::Value::String(raw.to_string()),
        ScalarType::Integer => raw
            .parse::<i64>()
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string())),
        ScalarType::Number => raw
            .parse::<f64>()
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string())),
        ScalarType::Boolean => {
            serde_json::Value::Bool(matches!(raw, "true" | "yes" | "y" | "1"))
        }
    }
}

/// Fill a tool's input form and invoke it directly, outside a model turn.
async fn test_tool(
    editor: &mut DefaultEditor,
    mcp: &HttpMcpClient,
    tools: &[ToolDef],
    name: &str,
) -> Result<()> {
    let tool = tools
        .iter()
        .find(|tool| tool.name == name)
        .with_context(|| format!("unknown tool '{name}'"))?;

    let arguments = fill_form(editor, &tool.input_schema)?;
    let result = mcp.call_tool(&tool.name, arguments).await?;
    let interpreted = interpret::interpret(&result.text());
    if !interpreted.display_text.is_empty() {
        println!("{}", interpreted.display_text);
    }
    render_layouts(&interpreted.layouts);
    Ok(())
}

/// Print events as they arrive. Stream deltas are written without a
/// trailing newline so tokens appear as the model produces them.
fn render_event(event: &ChatEvent) {
    match event {
        ChatEvent::StreamDelta { text } => {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
        ChatEvent::BotMessage { text, layouts } => {
            if !text.is_empty() {
                println!("\n{text}");
            }
            render_layouts(layouts);
        }
        ChatEvent::ToolProgress { current, total } if *total > 0 => {
            eprintln!("\n[tool {current}/{total}]");
        }
        ChatEvent::Notification { level, message } => match level {
            Level::Error => eprintln!("error: {message}"),
            Level::Warning => eprintln!("warning: {message}"),
            Level::Info => eprintln!("{message}"),
        },
        ChatEvent::ServerInstructions { text } => {
            println!("Server instructions:\n{text}");
        }
        _ => {}
    }
}

fn render_layouts(layouts: &[Layout]) {
    for layout in layouts {
        match layout {
            Layout::Table { data } => {
                if !data.table_name.is_empty() {
                    println!("{}", data.table_name);
                }
                println!("{}", data.column_names.join(" | "));
                for row in &data.data {
                    let cells: Vec<String> = row
                        .iter()
                        .map(|cell| match cell.as_str() {
                            Some(text) => text.to_string(),
                            None => cell.to_string(),
                        })
                        .collect();
                    println!("{}", cells.join(" | "));
                }
            }
            Layout::Button { data } => {
                println!("[{}] {}", data.title, data.link);
            }
            Layout::Form { data } => {
                // The schema re-enters the form engine so the field list
                // shown matches what an interactive fill would prompt.
                let state = form::builder::build(&data.schema);
                println!("Form: {}", data.title);
                for field in &state.fields {
                    let marker = if field.descriptor.required { "*" } else { "" };
                    println!("  {}{}", field.descriptor.name, marker);
                }
            }
            other => {
                println!("({} layout)", other.type_name());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serde_json::json;

    #[test]
    fn test_fill_form_prompts_nested_required_fields() {
        let schema = json!({
            "type": "object",
            "properties": {
                "address": {
                    "type": "object",
                    "properties": {"street": {"type": "string"}},
                    "required": ["street"]
                }
            },
            "required": ["address"]
        });
        let mut inputs = vec!["Main St".to_string()];
        let mut prompts = Vec::new();
        let mut read = |prompt: &str| -> Result<String> {
            prompts.push(prompt.to_string());
            Ok(inputs.remove(0))
        };
        let value = fill_form_with(&mut read, &schema).unwrap();
        assert_eq!(value, json!({"address": {"street": "Main St"}}));
        assert!(prompts[0].contains("address.street"));
    }

    #[test]
    fn test_api_key_prefers_stored_token_over_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::at(dir.path().join("session.json"));
        store.set(KEY_API_TOKEN, "stored-token").unwrap();
        let llm = LlmConfig {
            api_key_env: "TOOLCHAT_TEST_UNSET_KEY".to_string(),
            ..LlmConfig::default()
        };
        let mut prompt = || -> Result<String> { panic!("prompt must not run") };
        let key = resolve_api_key(&llm, &store, &mut prompt).unwrap();
        assert_eq!(key.expose_secret(), "stored-token");
    }

    #[test]
    fn test_api_key_prompt_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::at(dir.path().join("session.json"));
        let llm = LlmConfig {
            api_key_env: "TOOLCHAT_TEST_UNSET_KEY".to_string(),
            ..LlmConfig::default()
        };
        let mut prompt = || -> Result<String> { Ok("  typed-token  ".to_string()) };
        let key = resolve_api_key(&llm, &store, &mut prompt).unwrap();
        assert_eq!(key.expose_secret(), "typed-token");
        assert_eq!(store.get(KEY_API_TOKEN).as_deref(), Some("typed-token"));
    }

    #[test]
    fn test_config_api_key_wins_over_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::at(dir.path().join("session.json"));
        store.set(KEY_API_TOKEN, "stored-token").unwrap();
        let llm = LlmConfig {
            api_key: Some("config-key".to_string()),
            ..LlmConfig::default()
        };
        let mut prompt = || -> Result<String> { panic!("prompt must not run") };
        let key = resolve_api_key(&llm, &store, &mut prompt).unwrap();
        assert_eq!(key.expose_secret(), "config-key");
    }
}
