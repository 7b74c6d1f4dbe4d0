use std::sync::Arc;
use std::time::Duration;

use pier_model::ModelProvider;

use super::{Agent, TranscriptFn, TranscriptSource};
use crate::checkpoint::{Checkpointer, InMemoryCheckpointer};
use crate::model_client::ModelClient;
use crate::tool::{AnyTool, Tool, ToolObject};

/// The number of model calls allowed in one turn by default.
pub const DEFAULT_MAX_STEPS: usize = 8;

/// [`Agent`] builder.
pub struct AgentBuilder {
    pub(crate) model_client: ModelClient,
    pub(crate) system_prompt: Option<String>,
    pub(crate) tools: Vec<Box<dyn ToolObject>>,
    pub(crate) checkpointer: Arc<dyn Checkpointer>,
    pub(crate) max_steps: usize,
    pub(crate) on_transcript: Option<TranscriptFn>,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model provider.
    ///
    /// Conversations are kept in an [`InMemoryCheckpointer`] unless
    /// another checkpointer is set.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            system_prompt: None,
            tools: vec![],
            checkpointer: Arc::new(InMemoryCheckpointer::new()),
            max_steps: DEFAULT_MAX_STEPS,
            on_transcript: None,
        }
    }

    /// Sets the system prompt sent before every conversation.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.tools.push(Box::new(AnyTool(tool)));
        self
    }

    /// Sets where conversations are saved between invocations.
    #[inline]
    pub fn with_checkpointer<C: Checkpointer>(mut self, checkpointer: C) -> Self {
        self.checkpointer = Arc::new(checkpointer);
        self
    }

    /// Sets the maximum number of model calls in one turn.
    #[inline]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Sets how long rate limited requests are retried.
    #[inline]
    pub fn with_max_retry_time(mut self, max_retry_time: Duration) -> Self {
        self.model_client.set_max_retry_time(max_retry_time);
        self
    }

    /// Attaches a callback receiving the streamed transcript.
    #[inline]
    pub fn on_transcript(
        mut self,
        on_transcript: impl Fn(&str, TranscriptSource) + Send + Sync + 'static,
    ) -> Self {
        self.on_transcript = Some(Arc::new(on_transcript));
        self
    }

    /// Builds the agent.
    #[inline]
    pub fn build(self) -> Agent {
        Agent::from_builder(self)
    }
}
