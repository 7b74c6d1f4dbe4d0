use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use pier_model::{
    ModelFinishReason, ModelProvider, ModelProviderError, ModelRequest,
    ModelResponse, ModelResponseEvent, OpaqueMessage, ToolCallRequest,
};
use tracing::Instrument;

pub type DeltaFn = Arc<dyn Fn(&str) + Send + Sync>;
type SendRequestResult =
    Result<ModelClientResponse, Box<dyn ModelProviderError>>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type HandlerFn =
    Arc<dyn Fn(ModelRequest, DeltaFn) -> BoxedSendRequestFuture + Send + Sync>;

/// A wrapper around a model provider that provides a type-erased
/// interface for the other modules and retries rate limited requests.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
    max_retry_time: Duration,
}

impl ModelClient {
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req, on_delta| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    let resp_or_err = fut.await;
                    handle_response::<P>(resp_or_err, on_delta).await
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self {
            handler_fn,
            max_retry_time: Duration::from_secs(60),
        }
    }

    #[inline]
    pub fn set_max_retry_time(&mut self, max_retry_time: Duration) {
        self.max_retry_time = max_retry_time;
    }

    /// Sends a request and returns the fully received response.
    ///
    /// Transient failures are retried with exponential backoff until
    /// `max_retry_time` has elapsed.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    pub async fn send_request(
        &self,
        req: ModelRequest,
        on_delta: DeltaFn,
    ) -> SendRequestResult {
        let policy = self.retry_policy();
        backoff::future::retry(policy, || {
            let fut = (self.handler_fn)(req.clone(), Arc::clone(&on_delta));
            async move {
                fut.await.map_err(|err| {
                    if err.kind().is_transient() {
                        warn!("transient model error, retrying: {err}");
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            }
        })
        .await
    }

    fn retry_policy(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(10))
            .with_max_elapsed_time(Some(self.max_retry_time))
            .build()
    }
}

/// A completely received response from the model client.
#[derive(Clone, Debug)]
pub struct ModelClientResponse {
    pub transcript: String,
    pub opaque_msg: Option<OpaqueMessage>,
    /// Tool calls requested by the model.
    pub tool_calls: Vec<ToolCallRequest>,
    /// The reason the model finished generating.
    pub finish_reason: Option<ModelFinishReason>,
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
    on_delta: DeltaFn,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err:?}");
            return Err(Box::new(err));
        }
    };

    let mut transcript = String::new();
    let opaque_msg;
    let mut tool_calls = Vec::new();
    let mut finish_reason = None;

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(event) => event,
            Err(err) => {
                error!("got an error: {err:?}");
                return Err(Box::new(err));
            }
        };

        let Some(event) = event else {
            opaque_msg = pinned_resp.make_opaque_message();
            break;
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(msg) => {
                on_delta(&msg);
                transcript.push_str(&msg);
            }
            ModelResponseEvent::ToolCall(req) => {
                tool_calls.push(req);
            }
            ModelResponseEvent::Completed(reason) => {
                finish_reason = Some(reason);
            }
        }
    }

    if finish_reason == Some(ModelFinishReason::Length) {
        warn!("the model output was truncated");
    }
    trace!("finished a request");

    Ok(ModelClientResponse {
        transcript,
        opaque_msg,
        tool_calls,
        finish_reason,
    })
}
