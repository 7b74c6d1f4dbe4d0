use std::pin::Pin;
use std::task::{self, Poll};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::OpaqueMessage;
use crate::provider::ModelProviderError;

/// A streamed response from the model provider.
pub trait ModelResponse: Sized + Send + 'static {
    /// The error type that may be returned by the provider.
    type Error: ModelProviderError;

    /// Attempts to pull out the next event from the response.
    ///
    /// # Return value
    ///
    /// - `Poll::Pending`: no event yet, the task will be woken up.
    /// - `Poll::Ready(Ok(Some(event)))`: an event, more may follow.
    /// - `Poll::Ready(Ok(None))`: the response has completed. Polling
    ///   again keeps returning `None`.
    /// - `Poll::Ready(Err(error))`: the response failed.
    ///
    /// Events are ordered: message deltas first, then tool calls, then a
    /// single [`ModelResponseEvent::Completed`].
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>>;

    /// Makes an [`OpaqueMessage`] holding the complete assistant message.
    ///
    /// Only meaningful after all events have been polled. Returning
    /// `None` makes the agent fall back to a text-only history entry,
    /// which loses tool calls.
    fn make_opaque_message(&self) -> Option<OpaqueMessage> {
        None
    }
}

/// The reason why a model response has finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFinishReason {
    /// The model needs to call a tool.
    ToolCalls,
    /// The model has finished generating text.
    Stop,
    /// The output was cut by the token limit.
    Length,
}

/// Describes a tool call request from the model.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// The unique identifier for the tool call request.
    pub id: String,
    /// The name of the tool to call.
    pub name: String,
    /// The arguments object, as decoded from the model output.
    pub arguments: Value,
}

/// The event from a model response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelResponseEvent {
    /// The response has been completed.
    Completed(ModelFinishReason),
    /// Received a message delta.
    MessageDelta(String),
    /// Received a tool call request.
    ToolCall(ToolCallRequest),
}
