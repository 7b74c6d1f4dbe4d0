#[cfg(feature = "fastembed")]
use std::path::PathBuf;
#[cfg(feature = "fastembed")]
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
#[cfg(feature = "fastembed")]
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The sentence-transformer the knowledge base is built with.
pub const DEFAULT_EMBEDDING_MODEL: &str = "paraphrase-multilingual-MiniLM-L12-v2";

const BATCH_SIZE: usize = 64;

/// Turns texts into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds every text, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embeds a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_owned()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::Embedding("empty embedding response".to_owned()))
    }

    /// A short name for logs.
    fn name(&self) -> &str;
}

/// Scales `vector` to unit length. Zero vectors are left alone.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

/// An OpenAI-compatible `/embeddings` endpoint.
///
/// Works with text-embeddings-inference, Ollama and most servers hosting
/// sentence-transformers models.
#[derive(Clone, Debug)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    normalize: bool,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl HttpEmbedder {
    /// Creates an embedder for `model` served at `base_url`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            model: model.into(),
            api_key: None,
            normalize: true,
        }
    }

    /// Sends `api_key` as a bearer token.
    #[inline]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Whether vectors are scaled to unit length. On by default.
    #[inline]
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let mut req = self.client.post(&url).json(&EmbeddingRequest {
            model: &self.model,
            input,
        });
        if let Some(api_key) = &self.api_key {
            req = req.bearer_auth(api_key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!("{status}: {body}")));
        }

        let mut resp: EmbeddingResponse = resp.json().await?;
        if resp.data.len() != input.len() {
            return Err(Error::Embedding(format!(
                "expected {} embeddings, got {}",
                input.len(),
                resp.data.len()
            )));
        }
        resp.data.sort_by_key(|data| data.index);
        Ok(resp.data.into_iter().map(|data| data.embedding).collect())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(BATCH_SIZE) {
            trace!("embedding {} texts with {}", batch.len(), self.model);
            vectors.extend(self.request(batch).await?);
        }
        if self.normalize {
            vectors.iter_mut().for_each(|v| normalize(v));
        }
        Ok(vectors)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Runs [`DEFAULT_EMBEDDING_MODEL`] in process with ONNX Runtime.
///
/// The model is downloaded on first use and loaded once, clones share it.
/// Vectors are scaled to unit length.
#[cfg(feature = "fastembed")]
#[derive(Clone)]
pub struct FastEmbedder {
    model: Arc<Mutex<Option<TextEmbedding>>>,
    cache_dir: Option<PathBuf>,
    show_download_progress: bool,
}

#[cfg(feature = "fastembed")]
impl Default for FastEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "fastembed")]
impl FastEmbedder {
    /// Creates an embedder. Nothing is loaded until the first text.
    pub fn new() -> Self {
        Self {
            model: Arc::default(),
            cache_dir: None,
            show_download_progress: false,
        }
    }

    /// Keeps the downloaded model files in `cache_dir`.
    #[inline]
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }

    /// Shows a progress bar while the model downloads.
    #[inline]
    pub fn with_show_download_progress(mut self, show: bool) -> Self {
        self.show_download_progress = show;
        self
    }

    fn embed_blocking(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let mut model = self.model.lock().unwrap_or_else(|e| e.into_inner());
        if model.is_none() {
            info!("loading {DEFAULT_EMBEDDING_MODEL}");
            let mut options = InitOptions::new(EmbeddingModel::ParaphraseMLMiniLML12V2)
                .with_show_download_progress(self.show_download_progress);
            if let Some(cache_dir) = &self.cache_dir {
                options = options.with_cache_dir(cache_dir.clone());
            }
            let loaded =
                TextEmbedding::try_new(options).map_err(|e| Error::Embedding(e.to_string()))?;
            *model = Some(loaded);
        }
        let Some(model) = model.as_mut() else {
            return Err(Error::Embedding("model is not loaded".to_owned()));
        };

        let mut vectors = model
            .embed(texts, Some(BATCH_SIZE))
            .map_err(|e| Error::Embedding(e.to_string()))?;
        vectors.iter_mut().for_each(|v| normalize(v));
        Ok(vectors)
    }
}

#[cfg(feature = "fastembed")]
#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        trace!("embedding {} texts in process", texts.len());
        let embedder = self.clone();
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || embedder.embed_blocking(texts))
            .await
            .map_err(|e| Error::Embedding(e.to_string()))?
    }

    fn name(&self) -> &str {
        DEFAULT_EMBEDDING_MODEL
    }
}

/// Offline embeddings by feature hashing.
///
/// Each lowercased word is hashed into one of `dimension` buckets with a
/// hash-derived sign. Texts sharing words end up close, which is enough
/// for keyword-like retrieval in tests.
#[cfg(any(test, feature = "test-util"))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashEmbedder {
    dimension: usize,
}

#[cfg(any(test, feature = "test-util"))]
impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dimension: 384 }
    }
}

#[cfg(any(test, feature = "test-util"))]
impl HashEmbedder {
    /// Creates an embedder producing `dimension`-sized vectors.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Returns the vector size.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        let words = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty());
        for word in words {
            let hash = fnv1a(word.to_lowercase().as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        normalize(&mut vector);
        vector
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn name(&self) -> &str {
        "hash"
    }
}

#[cfg(any(test, feature = "test-util"))]
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf29ce484222325, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x100000001b3)
    })
}
