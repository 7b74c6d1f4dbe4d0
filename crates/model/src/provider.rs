use std::error::Error;

use crate::error::ErrorKind;
use crate::request::ModelRequest;
use crate::response::ModelResponse;

/// The error type for a model provider.
pub trait ModelProviderError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}

/// A chat model backend.
///
/// Providers are stateless from the caller's point of view: all the
/// conversation state travels in the [`ModelRequest`]. A provider may be
/// shared by many agents and dropped at any time.
pub trait ModelProvider: Send + Sync {
    /// The error type that may be returned by the provider.
    type Error: ModelProviderError;

    /// The streamed response type.
    type Response: ModelResponse<Error = Self::Error>;

    /// Sends a request to the model.
    ///
    /// The returned future must not borrow `self` or `req`.
    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static;
}
