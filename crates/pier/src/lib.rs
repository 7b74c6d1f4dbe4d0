//! Sunny, a grumpy surf forecaster, and Bacchus, a wine sommelier.
//!
//! The crate wires the agent from [`pier_core`] to weather, marine and web
//! search tools, and to the local surf knowledge base. It ships a CLI for
//! chatting in the terminal, and can be used as a library to host the
//! personas elsewhere.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod config;
pub mod persona;
mod session;
pub mod tools;

pub use config::{ConfigError, Settings};
pub use persona::{Persona, ToolKind, is_exit_word};
pub use session::{
    HistoryEntry, Role, Session, SessionBuilder, SessionError, reports_dream_session,
};

/// Re-exports of [`pier_core`] crate.
pub mod core {
    pub use pier_core::*;
}
