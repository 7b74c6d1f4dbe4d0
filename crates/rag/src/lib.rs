//! Local retrieval for the surf knowledge base.
//!
//! Documents are split into overlapping chunks, embedded, and stored in
//! collections of a SQLite database. Queries return the chunks closest to
//! the query embedding by cosine similarity.
//!
//! The `fastembed` feature, on by default, embeds in process. The
//! `test-util` feature exposes `HashEmbedder` for tests that must not
//! download a model.

#[macro_use]
extern crate tracing;

mod chunk;
mod document;
mod embed;
mod error;
mod knowledge;
mod store;

pub use chunk::{ChunkConfig, ChunkUnit, chunk_text};
pub use document::Document;
#[cfg(feature = "fastembed")]
pub use embed::FastEmbedder;
#[cfg(any(test, feature = "test-util"))]
pub use embed::HashEmbedder;
pub use embed::{DEFAULT_EMBEDDING_MODEL, Embedder, HttpEmbedder, normalize};
pub use error::{Error, Result};
pub use knowledge::{DEFAULT_RESULTS, KnowledgeBase, NO_INFORMATION};
pub use store::{Collection, DATABASE_FILE, QueryHit, Record, VectorDb, cosine_similarity};
