//! Settings read from the environment and an optional `.env` file.

use std::path::PathBuf;
use std::sync::Arc;

use pier_openai_model::{OpenAIConfig, OpenAIConfigBuilder};
use pier_rag::{
    DEFAULT_EMBEDDING_MODEL, Embedder, FastEmbedder, HttpEmbedder, KnowledgeBase, VectorDb,
};

use crate::persona::Persona;
use crate::tools::{Endpoints, Toolbox};

const DEFAULT_RAG_DIR: &str = "./chroma_db";
const DEFAULT_RAG_COLLECTION: &str = "surf_rag";
const DEFAULT_USER_ID: &str = "1";

/// Invalid or missing settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Neither `GROQ_API_KEY` nor `OPENAI_API_KEY` is set.
    #[error("GROQ_API_KEY (or OPENAI_API_KEY) environment variable is not set")]
    MissingApiKey,
    /// The knowledge base could not be opened.
    #[error("cannot open the knowledge base: {0}")]
    KnowledgeBase(#[from] pier_rag::Error),
}

/// Where embeddings come from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EmbeddingSettings {
    /// OpenAI-compatible `/embeddings` server. Embeds in process if unset.
    pub base_url: Option<String>,
    /// The model name sent to the embedding server.
    pub model: String,
    /// Bearer token of the embedding server.
    pub api_key: Option<String>,
    /// Where the in-process model is downloaded.
    pub cache_dir: Option<PathBuf>,
}

/// Everything the binary reads from the environment.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// Chat model API key.
    pub api_key: Option<String>,
    /// Chat model base URL, the Groq endpoint if unset.
    pub base_url: Option<String>,
    /// Overrides the persona default model.
    pub model: Option<String>,
    /// The user handed to tools.
    pub user_id: String,
    /// Enables StormGlass marine data.
    pub stormglass_key: Option<String>,
    /// Embedding server settings.
    pub embedding: EmbeddingSettings,
    /// Directory of the vector collections.
    pub rag_dir: PathBuf,
    /// Collection holding the surf knowledge.
    pub rag_collection: String,
    /// Files indexed on startup when missing from the collection.
    pub knowledge_files: Vec<PathBuf>,
}

impl Settings {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => debug!("loaded {}", path.display()),
            Err(err) if err.not_found() => {}
            Err(err) => warn!("ignoring .env: {err}"),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the settings through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let knowledge_files = get("PIER_KNOWLEDGE")
            .map(|files| {
                files
                    .split(',')
                    .map(str::trim)
                    .filter(|file| !file.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            api_key: get("GROQ_API_KEY").or_else(|| get("OPENAI_API_KEY")),
            base_url: get("PIER_BASE_URL"),
            model: get("PIER_MODEL"),
            user_id: get("PIER_USER_ID").unwrap_or_else(|| DEFAULT_USER_ID.to_owned()),
            stormglass_key: get("STORMGLASS_API_KEY"),
            embedding: EmbeddingSettings {
                base_url: get("EMBEDDING_BASE_URL"),
                model: get("EMBEDDING_MODEL")
                    .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_owned()),
                api_key: get("EMBEDDING_API_KEY"),
                cache_dir: get("EMBEDDING_CACHE_DIR").map(PathBuf::from),
            },
            rag_dir: get("PIER_RAG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RAG_DIR)),
            rag_collection: get("PIER_RAG_COLLECTION")
                .unwrap_or_else(|| DEFAULT_RAG_COLLECTION.to_owned()),
            knowledge_files,
        }
    }

    /// Builds the chat model config of `persona`.
    pub fn provider_config(&self, persona: Persona) -> Result<OpenAIConfig, ConfigError> {
        let api_key = self.api_key.clone().ok_or(ConfigError::MissingApiKey)?;
        let mut builder = OpenAIConfigBuilder::with_api_key(api_key)
            .with_model(self.model.as_deref().unwrap_or(persona.default_model()))
            .with_temperature(persona.temperature())
            .with_max_tokens(persona.max_tokens());
        if let Some(base_url) = &self.base_url {
            builder = builder.with_base_url(base_url);
        }
        Ok(builder.build())
    }

    /// The embedder used for indexing and search.
    ///
    /// Runs [`DEFAULT_EMBEDDING_MODEL`] in process unless an embedding
    /// server is configured.
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        let settings = &self.embedding;
        let Some(base_url) = &settings.base_url else {
            if settings.model != DEFAULT_EMBEDDING_MODEL {
                warn!(
                    "EMBEDDING_MODEL needs EMBEDDING_BASE_URL, using {DEFAULT_EMBEDDING_MODEL}"
                );
            }
            let mut embedder = FastEmbedder::new().with_show_download_progress(true);
            if let Some(cache_dir) = &settings.cache_dir {
                embedder = embedder.with_cache_dir(cache_dir);
            }
            return Arc::new(embedder);
        };

        let mut embedder = HttpEmbedder::new(base_url, &settings.model);
        if let Some(api_key) = &settings.api_key {
            embedder = embedder.with_api_key(api_key);
        }
        Arc::new(embedder)
    }

    /// Opens the knowledge collection, creating it if needed.
    pub fn open_knowledge_base(&self) -> Result<KnowledgeBase, ConfigError> {
        let db = VectorDb::open(&self.rag_dir)?;
        let collection = db.get_or_create_collection(&self.rag_collection)?;
        Ok(KnowledgeBase::new(collection, self.embedder()))
    }

    /// Builds the tool clients.
    pub fn toolbox(&self) -> Toolbox {
        Toolbox::new(Endpoints::default()).with_stormglass_key(self.stormglass_key.clone())
    }
}
