use pier_model::ToolCallRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "message_delta")]
    MessageDelta(String),
    #[serde(rename = "tool_call")]
    ToolCall(ToolCallRequest),
}

/// The preset response for one model call.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response, in emission order.
    pub events: Vec<PresetEvent>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
        }
    }

    /// A plain text answer streamed word by word.
    pub fn text(text: &str) -> Self {
        let mut events = Vec::new();
        let mut rest = text;
        while !rest.is_empty() {
            let cut = rest
                .char_indices()
                .skip_while(|(_, c)| c.is_whitespace())
                .find(|(_, c)| c.is_whitespace())
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            events.push(PresetEvent::MessageDelta(rest[..cut].to_owned()));
            rest = &rest[cut..];
        }
        Self { events }
    }

    /// A single tool call and nothing else.
    pub fn tool_call(id: &str, name: &str, arguments: Value) -> Self {
        Self::with_events([PresetEvent::ToolCall(ToolCallRequest {
            id: id.to_owned(),
            name: name.to_owned(),
            arguments,
        })])
    }

    /// Appends another tool call to this response.
    pub fn and_tool_call(mut self, id: &str, name: &str, arguments: Value) -> Self {
        self.events.push(PresetEvent::ToolCall(ToolCallRequest {
            id: id.to_owned(),
            name: name.to_owned(),
            arguments,
        }));
        self
    }

    pub(crate) fn has_tool_calls(&self) -> bool {
        self.events
            .iter()
            .any(|event| matches!(event, PresetEvent::ToolCall(_)))
    }

    pub(crate) fn transcript(&self) -> String {
        self.events
            .iter()
            .filter_map(|event| match event {
                PresetEvent::MessageDelta(delta) => Some(delta.as_str()),
                PresetEvent::ToolCall(_) => None,
            })
            .collect()
    }
}
