//! A model provider for OpenAI-compatible chat completion APIs.
//!
//! The bots run on Groq, which speaks this protocol, but any server
//! implementing streamed `/chat/completions` with function tools works.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use mime::Mime;
use pier_model::{ErrorKind, ModelProvider, ModelProviderError, ModelRequest};
use reqwest::{Client, StatusCode, header};

pub use config::{
    DEFAULT_BASE_URL, DEFAULT_MODEL, OpenAIConfig, OpenAIConfigBuilder,
};
use io::{Chunks, Sse};
pub use response::OpenAIResponse;

/// Error type for [`OpenAIProvider`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// OpenAI-compatible model provider.
#[derive(Clone, Debug)]
pub struct OpenAIProvider {
    client: Client,
    config: Arc<OpenAIConfig>,
}

impl OpenAIProvider {
    /// Creates a new `OpenAIProvider` with the given configuration.
    #[inline]
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }

    /// Returns the configuration of this provider.
    #[inline]
    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }
}

impl ModelProvider for OpenAIProvider {
    type Error = Error;
    type Response = OpenAIResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let body = proto::create_request(req, &self.config);
        let resp_fut = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.config.api_key),
            )
            .header(header::ACCEPT, "text/event-stream")
            .json(&body)
            .send();

        async move {
            let resp = resp_fut
                .await
                .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                let message = serde_json::from_str::<proto::ErrorBody>(&body)
                    .map(|b| b.error.message)
                    .unwrap_or(body);
                let kind = if status == StatusCode::TOO_MANY_REQUESTS {
                    ErrorKind::RateLimitExceeded
                } else {
                    ErrorKind::Other
                };
                warn!("chat completion failed with {status}: {message}");
                return Err(Error::new(format!("{status}: {message}"), kind));
            }

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_event_stream = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| m.subtype().as_str() == "event-stream")
                .unwrap_or(false);
            if !is_event_stream {
                return Err(Error::new(
                    format!("unexpected content type: {content_type:?}"),
                    ErrorKind::Other,
                ));
            }

            let sse = Sse::new(Chunks::from_response(resp));
            Ok(OpenAIResponse::from_sse(sse))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use mockito::Matcher;
    use pier_model::{ModelMessage, ModelResponse, ModelResponseEvent};
    use serde_json::json;

    use super::*;

    fn provider(base_url: String) -> OpenAIProvider {
        OpenAIProvider::new(
            OpenAIConfigBuilder::with_api_key("gsk_test")
                .with_base_url(base_url)
                .with_model("llama-3.3-70b-versatile")
                .build(),
        )
    }

    fn hello() -> ModelRequest {
        ModelRequest {
            messages: vec![ModelMessage::User("Salut".to_owned())],
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn test_streams_from_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer gsk_test")
            .match_body(Matcher::PartialJson(json!({
                "model": "llama-3.3-70b-versatile",
                "stream": true
            })))
            .with_header("content-type", "text/event-stream")
            .with_body(concat!(
                "data: {\"id\":\"x\",\"choices\":[{\"delta\":{\"content\":\"Santé\"},\"finish_reason\":null}]}\n\n",
                "data: {\"id\":\"x\",\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
                "data: [DONE]\n\n",
            ))
            .create_async()
            .await;

        let resp = provider(server.url()).send_request(&hello()).await.unwrap();
        let mut resp = pin!(resp);
        let first = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
        assert_eq!(
            first.unwrap(),
            Some(ModelResponseEvent::MessageDelta("Santé".to_owned()))
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_kind() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body(r#"{"error":{"message":"Rate limit reached"}}"#)
            .create_async()
            .await;

        let err = provider(server.url())
            .send_request(&hello())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        assert!(err.message().contains("Rate limit reached"));
    }

    #[tokio::test]
    async fn test_rejects_non_stream_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_header("content-type", "application/json")
            .with_body("{}")
            .create_async()
            .await;

        let err = provider(server.url())
            .send_request(&hello())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Other);
    }
}
