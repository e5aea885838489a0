//! Agent loop and execution components.
//!
//! - `core` - The streaming tool-calling loop
//! - `cancel` - Cooperative cancellation token

pub mod cancel;
pub mod core;

pub use cancel::CancelToken;
pub use core::{
    Agent, AgentLoopConfig, AgentSession, TurnOutcome, TurnResult, DEFAULT_MAX_ITERATIONS,
};
