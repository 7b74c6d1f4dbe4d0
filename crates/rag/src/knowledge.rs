use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::chunk::{ChunkConfig, chunk_text};
use crate::document::{Document, source_name};
use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::store::{Collection, QueryHit, Record};

/// Passages returned by [`KnowledgeBase::ask`] unless told otherwise.
pub const DEFAULT_RESULTS: usize = 3;

/// What [`KnowledgeBase::ask`] answers when nothing matches.
pub const NO_INFORMATION: &str =
    "Aucune information trouvée dans la base de connaissances.";

/// A collection filled from documents and searched by meaning.
#[derive(Clone)]
pub struct KnowledgeBase {
    collection: Collection,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkConfig,
}

impl KnowledgeBase {
    /// Creates a knowledge base over `collection`.
    pub fn new(collection: Collection, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            collection,
            embedder,
            chunking: ChunkConfig::default(),
        }
    }

    /// Sets how documents are split.
    #[inline]
    pub fn with_chunk_config(mut self, chunking: ChunkConfig) -> Self {
        self.chunking = chunking;
        self
    }

    /// Returns the underlying collection.
    #[inline]
    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Loads, chunks and embeds `path`, replacing its previous chunks.
    ///
    /// The previous chunks are only dropped once the new ones are
    /// embedded, a failure leaves the collection as it was. Returns the
    /// number of stored chunks.
    pub async fn ingest(&self, path: impl AsRef<Path>) -> Result<usize> {
        let doc = Document::load(path)?;
        let chunks = chunk_text(&doc.text, &self.chunking)?;
        if chunks.is_empty() {
            warn!("{} has no text, nothing to index", doc.source);
            self.collection.replace_source(&doc.source, Vec::new())?;
            return Ok(0);
        }

        info!(
            "embedding {} chunks of {} with {}",
            chunks.len(),
            doc.source,
            self.embedder.name()
        );
        let embeddings = self.embedder.embed_batch(&chunks).await?;
        if embeddings.len() != chunks.len() {
            return Err(Error::Embedding(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }
        let records: Vec<Record> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (document, embedding))| {
                let mut metadata = Map::new();
                metadata.insert("source".to_owned(), Value::from(doc.source.as_str()));
                metadata.insert("chunk".to_owned(), Value::from(i));
                Record {
                    id: format!("{}#chunk_{i}", doc.source),
                    document,
                    embedding,
                    metadata,
                }
            })
            .collect();

        let count = records.len();
        self.collection.replace_source(&doc.source, records)?;
        Ok(count)
    }

    /// Ingests the documents whose source is not indexed yet.
    ///
    /// Returns the number of newly ingested documents. Running it again
    /// with the same paths does nothing. Missing files are skipped, the
    /// chunks already indexed from them are kept.
    pub async fn initialize<P: AsRef<Path>>(&self, paths: &[P]) -> Result<usize> {
        let mut ingested = 0;
        for path in paths {
            let path = path.as_ref();
            let source = source_name(path);
            if self.collection.has_source(&source)? {
                debug!("{source} is already indexed");
                continue;
            }
            if !path.exists() {
                warn!("{} does not exist, not indexing it", path.display());
                continue;
            }
            self.ingest(path).await?;
            ingested += 1;
        }
        if ingested > 0 {
            info!(
                "knowledge base ready, {} chunks in `{}`",
                self.collection.count()?,
                self.collection.name()
            );
        }
        Ok(ingested)
    }

    /// Returns the `n` chunks closest to `query`.
    pub async fn search(&self, query: &str, n: usize) -> Result<Vec<QueryHit>> {
        if n == 0 || self.collection.count()? == 0 {
            return Ok(Vec::new());
        }
        let embedding = self.embedder.embed(query).await?;
        self.collection.query(&embedding, n)
    }

    /// Answers `query` with the `n` closest passages, ready for a model.
    pub async fn ask(&self, query: &str, n: usize) -> Result<String> {
        let hits = self.search(query, n).await?;
        if hits.is_empty() {
            return Ok(NO_INFORMATION.to_owned());
        }
        let passages: Vec<String> = hits
            .iter()
            .map(|hit| {
                let source = hit
                    .metadata
                    .get("source")
                    .and_then(Value::as_str)
                    .unwrap_or("inconnue");
                format!("[Source : {source}]\n{}", hit.document)
            })
            .collect();
        Ok(passages.join("\n---\n"))
    }
}
