//! Core logic including the agent loop, tool execution and checkpoints.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
pub mod checkpoint;
pub mod conversation;
mod model_client;
pub mod tool;

pub use agent::{
    Agent, AgentBuilder, AgentError, DEFAULT_MAX_STEPS, RunConfig,
    TranscriptSource, Turn, TurnMessage,
};
pub use checkpoint::{Checkpointer, InMemoryCheckpointer};
pub use tool::{Tool, ToolContext, ToolResult};
