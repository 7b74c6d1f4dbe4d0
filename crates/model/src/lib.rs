//! The protocol spoken between the agent and a chat model.
//!
//! Every chat backend the bots can talk to (a hosted OpenAI-compatible
//! endpoint, a scripted model in tests) is expressed through the types in
//! this crate. The agent only ever sees [`ModelRequest`]s going out and a
//! stream of [`ModelResponseEvent`]s coming back.
//!
//! Nothing here performs I/O. Providers live in their own crates.

#![deny(missing_docs)]

mod error;
mod opaque;
mod provider;
mod request;
mod response;

pub use error::*;
pub use opaque::*;
pub use provider::*;
pub use request::*;
pub use response::*;
