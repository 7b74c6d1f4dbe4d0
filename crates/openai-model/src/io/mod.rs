//! Byte-level plumbing between the HTTP body and the event assembler.

mod chunks;
mod sse;

pub use chunks::{Chunks, Error as ChunksError};
pub use sse::{Error as SseError, Sse};
