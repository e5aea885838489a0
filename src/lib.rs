//! Terminal MCP chat client.
//!
//! Connects to a Model Context Protocol server, lets an OpenAI-compatible
//! model decide when to invoke server-exposed tools, and renders tool
//! results (tables, maps, kanban boards, forms, buttons) into a chat
//! transcript. The two load-bearing pieces are the dynamic schema-to-form
//! engine ([`schema`], [`form`]) and the agentic tool-calling loop
//! ([`agent`]); everything else is plumbing around them.

pub mod agent;
pub mod config;
pub mod events;
pub mod form;
pub mod interpret;
pub mod layout;
pub mod llm;
pub mod mcp;
pub mod schema;
pub mod storage;
pub mod toolformat;
pub mod transcript;
