//! A scripted model for testing agents without a network.
//!
//! Each call to [`ScriptedModelProvider::send_request`] consumes the next
//! step of the script, in the order the steps were pushed, regardless of
//! the request content. Every request is recorded so tests can assert on
//! what the agent actually sent.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use pier_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent, OpaqueMessage,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

/// The error returned by scripted failures.
#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
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

/// What the scripted model stores in the conversation history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptedMessage {
    /// The streamed text.
    pub text: String,
    /// Whether this turn asked for tools.
    pub called_tools: bool,
}

enum Step {
    Respond(PresetResponse),
    Fail(ErrorKind),
}

#[derive(Default)]
struct Script {
    steps: VecDeque<Step>,
    requests: Vec<ModelRequest>,
    served: usize,
}

/// A model answering from a script. Clones share the same script.
#[derive(Clone, Default)]
pub struct ScriptedModelProvider {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl ScriptedModelProvider {
    /// Creates an empty script. Requests fail until steps are pushed.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful response.
    pub fn push_response(&self, preset: PresetResponse) -> &Self {
        self.lock().steps.push_back(Step::Respond(preset));
        self
    }

    /// Queues a failed request of the given kind.
    pub fn push_failure(&self, kind: ErrorKind) -> &Self {
        self.lock().steps.push_back(Step::Fail(kind));
        self
    }

    /// Delays every streamed event by `duration`.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns a copy of every request received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.lock().requests.clone()
    }

    /// Returns the number of steps not consumed yet.
    pub fn remaining(&self) -> usize {
        self.lock().steps.len()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        // A panicking test thread must not hide the script from others.
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ModelProvider for ScriptedModelProvider {
    type Error = Error;
    type Response = ScriptedResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let mut script = self.lock();
        script.requests.push(req.clone());
        let result = match script.steps.pop_front() {
            Some(Step::Respond(preset)) => {
                script.served += 1;
                Ok(ScriptedResponse {
                    id: format!("scripted:{}", script.served),
                    preset,
                    event_idx: 0,
                    delay: self.delay.unwrap_or(Duration::from_millis(1)),
                    sleep: None,
                })
            }
            Some(Step::Fail(kind)) => Err(Error {
                message: "scripted failure",
                kind,
            }),
            None => Err(Error {
                message: "script exhausted",
                kind: ErrorKind::Other,
            }),
        };
        future::ready(result)
    }
}

/// A streamed scripted response.
pub struct ScriptedResponse {
    id: String,
    preset: PresetResponse,
    event_idx: usize,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for ScriptedResponse {
    type Error = Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        let events = &this.preset.events;
        if this.event_idx > events.len() {
            return Poll::Ready(Ok(None));
        }

        let delay = this.delay;
        let pending_sleep =
            this.sleep.get_or_insert_with(|| Box::pin(sleep(delay)));
        ready!(pending_sleep.as_mut().poll(cx));
        this.sleep = None;

        let event = match events.get(this.event_idx) {
            Some(PresetEvent::MessageDelta(delta)) => {
                ModelResponseEvent::MessageDelta(delta.clone())
            }
            Some(PresetEvent::ToolCall(req)) => {
                ModelResponseEvent::ToolCall(req.clone())
            }
            None => ModelResponseEvent::Completed(if this.preset.has_tool_calls() {
                ModelFinishReason::ToolCalls
            } else {
                ModelFinishReason::Stop
            }),
        };
        this.event_idx += 1;
        Poll::Ready(Ok(Some(event)))
    }

    fn make_opaque_message(&self) -> Option<OpaqueMessage> {
        Some(OpaqueMessage::new(
            self.id.clone(),
            ScriptedMessage {
                text: self.preset.transcript(),
                called_tools: self.preset.has_tool_calls(),
            },
        ))
    }
}
