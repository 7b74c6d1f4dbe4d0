//! Tool call supports.

mod error;
mod executor;

use std::pin::Pin;

use pier_model::ModelTool;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use error::{Error, ErrorKind};
pub(crate) use executor::Executor;

/// The result of a tool call.
pub type ToolResult = Result<String, Error>;

/// Who is calling a tool and in which conversation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ToolContext {
    /// The conversation thread.
    pub thread_id: String,
    /// The end user the agent is talking to.
    pub user_id: String,
}

/// A tool that can be called by the model.
///
/// Implementations should not keep per-call state. Anything that depends
/// on the caller arrives through the [`ToolContext`].
pub trait Tool: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    type Input: DeserializeOwned;

    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameter schema of the tool.
    fn parameter_schema(&self) -> &Value;

    /// Executes the tool with the given input.
    ///
    /// This method must return a future that is fully independent of `self`,
    /// and the future should be cancellation safe.
    fn execute(
        &self,
        input: Self::Input,
        ctx: ToolContext,
    ) -> impl Future<Output = ToolResult> + Send + 'static;
}

pub(crate) type BoxedToolFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;

pub(crate) trait ToolObject: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn definition(&self) -> ModelTool;

    fn execute(&self, arguments: Value, ctx: ToolContext) -> BoxedToolFuture;
}

pub(crate) struct AnyTool<T: Tool>(pub T);

impl<T: Tool> ToolObject for AnyTool<T> {
    #[inline]
    fn name(&self) -> &str {
        self.0.name()
    }

    fn definition(&self) -> ModelTool {
        ModelTool {
            name: self.0.name().to_owned(),
            description: self.0.description().to_owned(),
            parameters: self.0.parameter_schema().clone(),
        }
    }

    fn execute(&self, arguments: Value, ctx: ToolContext) -> BoxedToolFuture {
        // Providers hand over unparsable arguments as a raw string.
        let input: T::Input = match serde_json::from_value(arguments) {
            Ok(input) => input,
            Err(err) => {
                let reason = format!("invalid arguments: {err}");
                return Box::pin(std::future::ready(ToolResult::Err(
                    Error::invalid_input().with_reason(reason),
                )));
            }
        };
        Box::pin(self.0.execute(input, ctx))
    }
}
