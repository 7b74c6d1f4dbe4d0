use pier_model::{ModelMessage, ModelRequest, ModelTool};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::OpenAIConfig;

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionToolCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(skip_serializing)]
    pub index: Option<u32>,
    pub id: Option<String>,
    pub r#type: Option<String>,
    pub function: Option<FunctionToolCall>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Delta {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub reasoning_content: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
struct FunctionTool {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
struct Tool {
    r#type: &'static str,
    function: FunctionTool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolCall>>,
        // Groq and most compatible servers reject unknown fields in
        // history messages, so reasoning is kept locally only.
        #[serde(skip)]
        reasoning_content: Option<String>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

// -----------
// Conversions
// -----------

pub fn create_request(
    req: &ModelRequest,
    config: &OpenAIConfig,
) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: config.model.clone(),
        messages: req.messages.iter().map(create_message).collect(),
        tools: req.tools.iter().map(create_tool).collect(),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        stream: true,
    }
}

fn create_message(msg: &ModelMessage) -> Message {
    match msg {
        ModelMessage::System(content) => Message::System {
            content: content.clone(),
        },
        ModelMessage::User(content) => Message::User {
            content: content.clone(),
        },
        ModelMessage::Assistant(content) => Message::Assistant {
            content: Some(content.clone()),
            tool_calls: None,
            reasoning_content: None,
        },
        ModelMessage::Tool(result) => Message::Tool {
            tool_call_id: result.id.clone(),
            content: result.content.clone(),
        },
        ModelMessage::Opaque(opaque_message) => {
            // Opaque messages produced by this provider always wrap a
            // `Message`. Anything else came from another provider and
            // cannot be replayed faithfully.
            match opaque_message.to_raw::<Message>() {
                Some(msg) => msg.clone(),
                None => {
                    warn!("dropping foreign opaque message {opaque_message:?}");
                    Message::Assistant {
                        content: None,
                        tool_calls: None,
                        reasoning_content: None,
                    }
                }
            }
        }
    }
}

#[inline]
fn create_tool(tool: &ModelTool) -> Tool {
    Tool {
        r#type: "function",
        function: FunctionTool {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        },
    }
}
