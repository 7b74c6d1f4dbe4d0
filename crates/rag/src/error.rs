use std::path::PathBuf;

/// Errors raised by the retrieval pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid collection data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("vector database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("unsupported document format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("failed to extract text from {}: {reason}", .path.display())]
    Pdf { path: PathBuf, reason: String },

    #[error("chunk overlap ({overlap}) must be smaller than the chunk size ({size})")]
    InvalidChunkConfig { size: usize, overlap: usize },

    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding server error: {0}")]
    Embedding(String),

    #[error("embedding has {actual} dimensions, the collection uses {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("collection `{0}` does not exist")]
    CollectionNotFound(String),

    #[error("invalid collection name `{0}`")]
    InvalidCollectionName(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
