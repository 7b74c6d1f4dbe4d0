mod builder;
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::{Arc, Mutex};

use pier_model::{
    ModelMessage, ModelProviderError, ModelRequest, ToolCallResult,
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::Instrument;

use crate::checkpoint::Checkpointer;
use crate::conversation::Conversation;
use crate::model_client::{DeltaFn, ModelClient};
use crate::tool::{Executor as ToolExecutor, ToolContext};
pub use builder::{AgentBuilder, DEFAULT_MAX_STEPS};

/// Where a piece of streamed transcript comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TranscriptSource {
    /// A delta of the assistant reply.
    Assistant,
    /// The name of a tool the agent is about to run.
    ToolCall,
}

pub(crate) type TranscriptFn = Arc<dyn Fn(&str, TranscriptSource) + Send + Sync>;

/// Identifies the conversation and the user of an invocation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RunConfig {
    /// The conversation thread to continue.
    pub thread_id: String,
    /// The end user, handed to tools through [`ToolContext`].
    pub user_id: String,
}

impl RunConfig {
    /// Creates a config for `thread_id` and `user_id`.
    #[inline]
    pub fn new(thread_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// A message produced during one [`Agent::invoke`] call.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum TurnMessage {
    /// The user input that started the turn.
    User {
        /// The input text.
        content: String,
    },
    /// A tool call and what it returned to the model.
    Tool {
        /// The call id assigned by the model.
        id: String,
        /// The tool name.
        name: String,
        /// The arguments the model passed.
        arguments: Value,
        /// The output, or the rendered error.
        output: String,
    },
    /// The final assistant reply.
    Assistant {
        /// The reply text.
        content: String,
    },
}

/// The outcome of an [`Agent::invoke`] call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Turn {
    /// The final assistant reply.
    pub reply: String,
    /// Everything that happened during the turn, in order.
    pub messages: Vec<TurnMessage>,
}

impl Turn {
    /// Returns the outputs of the tool calls made during this turn.
    pub fn tool_outputs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.messages.iter().filter_map(|msg| match msg {
            TurnMessage::Tool { name, output, .. } => {
                Some((name.as_str(), output.as_str()))
            }
            _ => None,
        })
    }
}

/// Errors that abort a turn.
#[derive(Debug)]
pub enum AgentError {
    /// The model provider failed.
    Model(Box<dyn ModelProviderError>),
    /// The model kept calling tools for more than the allowed steps.
    StepLimitExceeded(usize),
}

impl Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::Model(err) => write!(f, "model request failed: {err}"),
            AgentError::StepLimitExceeded(steps) => {
                write!(f, "no answer after {steps} model calls")
            }
        }
    }
}

impl StdError for AgentError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            AgentError::Model(err) => Some(&**err as &(dyn StdError + 'static)),
            AgentError::StepLimitExceeded(_) => None,
        }
    }
}

/// A tool-calling agent with per-thread memory.
///
/// The agent is cheap to clone. Invocations on the same thread id are
/// served one at a time in arrival order; different threads run
/// concurrently.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<Inner>,
}

struct Inner {
    model_client: ModelClient,
    tool_executor: ToolExecutor,
    system_prompt: Option<String>,
    checkpointer: Arc<dyn Checkpointer>,
    max_steps: usize,
    on_transcript: Option<TranscriptFn>,
    thread_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Agent {
    fn from_builder(builder: AgentBuilder) -> Self {
        let AgentBuilder {
            model_client,
            system_prompt,
            tools,
            checkpointer,
            max_steps,
            on_transcript,
        } = builder;

        let inner = Inner {
            model_client,
            tool_executor: ToolExecutor::with_tools(tools),
            system_prompt,
            checkpointer,
            max_steps,
            on_transcript,
            thread_locks: Default::default(),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Runs one user turn and returns the final reply.
    ///
    /// The thread conversation is saved only when the turn succeeds.
    pub async fn invoke(
        &self,
        input: impl Into<String>,
        config: &RunConfig,
    ) -> Result<Turn, AgentError> {
        let span = info_span!("agent turn", thread = %config.thread_id);
        self.run_turn(input.into(), config).instrument(span).await
    }

    async fn run_turn(
        &self,
        input: String,
        config: &RunConfig,
    ) -> Result<Turn, AgentError> {
        let _guard = self.inner.lock_thread(&config.thread_id).await;

        let mut conversation = self
            .inner
            .checkpointer
            .load(&config.thread_id)
            .await
            .unwrap_or_default();
        conversation.push(ModelMessage::User(input.clone()), input.clone());

        let mut turn = Turn {
            reply: String::new(),
            messages: vec![TurnMessage::User { content: input }],
        };
        let ctx = ToolContext {
            thread_id: config.thread_id.clone(),
            user_id: config.user_id.clone(),
        };

        for step in 1..=self.inner.max_steps {
            debug!("model step {step}");
            let request = self.inner.build_model_request(&conversation);
            let resp = self
                .inner
                .model_client
                .send_request(request, self.inner.delta_fn())
                .await
                .map_err(AgentError::Model)?;

            let msg = match resp.opaque_msg {
                Some(opaque_msg) => ModelMessage::Opaque(opaque_msg),
                None => {
                    if !resp.tool_calls.is_empty() {
                        warn!("provider gave no opaque message, tool calls are lost");
                    }
                    ModelMessage::Assistant(resp.transcript.clone())
                }
            };
            conversation.push(msg, resp.transcript.clone());

            if resp.tool_calls.is_empty() {
                turn.messages.push(TurnMessage::Assistant {
                    content: resp.transcript.clone(),
                });
                turn.reply = resp.transcript;
                self.inner
                    .checkpointer
                    .save(&config.thread_id, conversation)
                    .await;
                return Ok(turn);
            }

            if let Some(on_transcript) = &self.inner.on_transcript {
                for req in &resp.tool_calls {
                    on_transcript(&req.name, TranscriptSource::ToolCall);
                }
            }
            let results =
                self.inner.tool_executor.run(&resp.tool_calls, &ctx).await;
            for (req, result) in resp.tool_calls.into_iter().zip(results) {
                let output = match result {
                    Ok(output) => output,
                    Err(err) => {
                        debug!("tool `{}` failed: {err}", req.name);
                        err.to_model_output()
                    }
                };
                conversation.push(
                    ModelMessage::Tool(ToolCallResult {
                        id: req.id.clone(),
                        content: output.clone(),
                    }),
                    output.clone(),
                );
                turn.messages.push(TurnMessage::Tool {
                    id: req.id,
                    name: req.name,
                    arguments: req.arguments,
                    output,
                });
            }
        }

        warn!("thread {} hit the step limit", config.thread_id);
        Err(AgentError::StepLimitExceeded(self.inner.max_steps))
    }

    /// Returns the saved conversation of `thread_id`.
    pub async fn conversation(&self, thread_id: &str) -> Option<Conversation> {
        self.inner.checkpointer.load(thread_id).await
    }

    /// Forgets everything said in `thread_id`.
    pub async fn clear_thread(&self, thread_id: &str) {
        let guard = self.inner.lock_thread(thread_id).await;
        self.inner.checkpointer.clear(thread_id).await;
        drop(guard);
        self.inner.release_thread(thread_id);
    }
}

impl Inner {
    async fn lock_thread(&self, thread_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .thread_locks
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(thread_id.to_owned()).or_default())
        };
        lock.lock_owned().await
    }

    /// Drops the lock of `thread_id` unless a turn holds or awaits it.
    fn release_thread(&self, thread_id: &str) {
        let mut locks = self
            .thread_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if locks
            .get(thread_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(thread_id);
        }
    }

    fn build_model_request(&self, conversation: &Conversation) -> ModelRequest {
        let system = self
            .system_prompt
            .as_ref()
            .map(|prompt| ModelMessage::System(prompt.clone()));
        ModelRequest {
            messages: system
                .into_iter()
                .chain(conversation.messages().cloned())
                .collect(),
            tools: self.tool_executor.definitions(),
        }
    }

    fn delta_fn(&self) -> DeltaFn {
        match &self.on_transcript {
            Some(on_transcript) => {
                let on_transcript = Arc::clone(on_transcript);
                Arc::new(move |delta| {
                    on_transcript(delta, TranscriptSource::Assistant)
                })
            }
            None => Arc::new(|_| {}),
        }
    }
}
