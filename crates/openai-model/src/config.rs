use std::fmt::{self, Debug};

/// Groq serves an OpenAI-compatible API, and it is what the bots use
/// unless told otherwise.
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// The model used when none is configured.
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

/// Builder for [`OpenAIConfig`].
#[derive(Clone, PartialEq)]
pub struct OpenAIConfigBuilder {
    api_key: String,
    model: Option<String>,
    base_url: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl OpenAIConfigBuilder {
    /// Creates a builder with the given API key.
    #[inline]
    pub fn with_api_key<S: Into<String>>(api_key: S) -> Self {
        Self {
            api_key: api_key.into(),
            model: None,
            base_url: None,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Sets the model to use.
    #[inline]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets a custom base URL, without the trailing `/chat/completions`.
    #[inline]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the sampling temperature.
    #[inline]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Caps the number of generated tokens per response.
    #[inline]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> OpenAIConfig {
        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        OpenAIConfig {
            api_key: self.api_key,
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            base_url: base_url.trim_end_matches('/').to_owned(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

impl Debug for OpenAIConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAIConfigBuilder")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Configuration for the OpenAI-compatible provider.
#[derive(Clone, PartialEq)]
pub struct OpenAIConfig {
    pub(crate) api_key: String,
    pub(crate) model: String,
    pub(crate) base_url: String,
    pub(crate) temperature: Option<f32>,
    pub(crate) max_tokens: Option<u32>,
}

impl OpenAIConfig {
    /// Returns the model name.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the base URL, without a trailing slash.
    #[inline]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Debug for OpenAIConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAIConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}
