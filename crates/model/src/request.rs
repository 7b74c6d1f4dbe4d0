use serde_json::Value;

use crate::OpaqueMessage;

/// A request to be sent to the model provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ModelRequest {
    /// The input messages, oldest first.
    pub messages: Vec<ModelMessage>,
    /// Tools that are available to the model.
    pub tools: Vec<ModelTool>,
}

/// A complete message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModelMessage {
    /// The system instructions.
    System(String),
    /// A user input text.
    User(String),
    /// An assistant text.
    Assistant(String),
    /// A tool call result.
    Tool(ToolCallResult),
    /// A provider-owned message, usually an assistant turn with tool calls.
    Opaque(OpaqueMessage),
}

impl ModelMessage {
    /// Returns the plain text of user, assistant and system messages.
    pub fn text(&self) -> Option<&str> {
        match self {
            ModelMessage::System(text)
            | ModelMessage::User(text)
            | ModelMessage::Assistant(text) => Some(text),
            ModelMessage::Tool(result) => Some(&result.content),
            ModelMessage::Opaque(_) => None,
        }
    }
}

/// The result of calling a tool.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ToolCallResult {
    /// The id of the tool call request this result answers.
    pub id: String,
    /// The result of the tool call.
    pub content: String,
}

/// Describes a tool that can be used by the model.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelTool {
    /// Name of the tool.
    pub name: String,
    /// Description of the tool, shown to the model.
    pub description: String,
    /// A [JSON schema](https://json-schema.org/) for the arguments object.
    pub parameters: Value,
}
