use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pier_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    OpaqueMessage, ToolCallRequest,
};
use pin_project_lite::pin_project;
use serde_json::Value;

use crate::Error;
use crate::io::Sse;
use crate::proto::{ChatCompletionChunk, Message, ToolCall};

/// Everything received so far for one streamed completion.
struct PartialState {
    sse: Sse,
    id: Option<String>,
    content: String,
    reasoning_content: Option<String>,
    tool_calls: Vec<ToolCall>,
    // Indexes into `tool_calls` that have not been emitted yet. Tool
    // calls are only emitted once the stream says the message is done,
    // since their arguments arrive in fragments.
    pending_tool_call_idx: VecDeque<usize>,
    finish_reason: Option<ModelFinishReason>,
    finished: bool,
    completed_sent: bool,
}

impl PartialState {
    fn new(sse: Sse) -> Self {
        Self {
            sse,
            id: None,
            content: String::new(),
            reasoning_content: None,
            tool_calls: Vec::new(),
            pending_tool_call_idx: VecDeque::new(),
            finish_reason: None,
            finished: false,
            completed_sent: false,
        }
    }

    fn into_message(self) -> Option<(String, Message)> {
        Some((
            self.id?,
            Message::Assistant {
                content: Some(self.content),
                tool_calls: (!self.tool_calls.is_empty())
                    .then_some(self.tool_calls),
                reasoning_content: self.reasoning_content,
            },
        ))
    }

    fn merge_tool_call(&mut self, tool_call: ToolCall) {
        let existing = self
            .tool_calls
            .iter_mut()
            .find(|t| t.index.is_some() && t.index == tool_call.index);
        let Some(partial) = existing else {
            self.tool_calls.push(tool_call);
            return;
        };
        if let Some(id) = tool_call.id {
            partial.id.get_or_insert_default().push_str(&id);
        }
        if let Some(ty) = tool_call.r#type {
            partial.r#type = Some(ty);
        }
        let Some(function) = tool_call.function else {
            return;
        };
        match &mut partial.function {
            Some(partial_func) => {
                if let Some(name) = function.name {
                    partial_func.name.get_or_insert_default().push_str(&name);
                }
                if let Some(arguments) = function.arguments {
                    partial_func
                        .arguments
                        .get_or_insert_default()
                        .push_str(&arguments);
                }
            }
            None => partial.function = Some(function),
        }
    }
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    /// A streamed chat completion.
    pub struct OpenAIResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
        full_msg: Option<(String, Message)>,
    }
}

impl OpenAIResponse {
    pub(crate) fn from_sse(sse: Sse) -> Self {
        let state = PartialState::new(sse);
        Self {
            next_event_fut: Some(Box::pin(next_event(state))),
            full_msg: None,
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, state) = match ready!(next_event_fut.as_mut().poll(cx)) {
            Ok((Some(event), state)) => (event, state),
            Ok((None, state)) => {
                *this.next_event_fut = None;
                *this.full_msg = state.into_message();
                return Poll::Ready(Ok(None));
            }
            Err(err) => {
                *this.next_event_fut = None;
                return Poll::Ready(Err(err));
            }
        };

        *this.next_event_fut = Some(Box::pin(next_event(state)));
        Poll::Ready(Ok(Some(event)))
    }

    fn make_opaque_message(&self) -> Option<OpaqueMessage> {
        self.full_msg
            .as_ref()
            .map(|(id, msg)| OpaqueMessage::new(id, msg.clone()))
    }
}

async fn next_event(mut state: PartialState) -> NextEvent {
    while !state.finished && state.finish_reason.is_none() {
        let payload = match state.sse.next_event().await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                state.finished = true;
                break;
            }
            Err(err) => {
                return Err(Error::new(format!("{err:?}"), ErrorKind::Other));
            }
        };
        trace!("got sse payload: {payload}");
        if payload == "[DONE]" {
            state.finished = true;
            break;
        }

        let chunk = serde_json::from_str::<ChatCompletionChunk>(&payload)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
        if state.id.get_or_insert_with(|| chunk.id.clone()) != &chunk.id {
            return Err(Error::new("chunk id mismatch", ErrorKind::Other));
        }

        // Usage-only chunks carry no choice.
        let Some(choice) = chunk.choices.into_iter().next() else {
            continue;
        };

        if let Some(reasoning) = &choice.delta.reasoning_content {
            state
                .reasoning_content
                .get_or_insert_default()
                .push_str(reasoning);
        }
        for tool_call in choice.delta.tool_calls.into_iter().flatten() {
            state.merge_tool_call(tool_call);
        }
        if let Some(reason) = choice.finish_reason {
            state.finish_reason = Some(match reason.as_str() {
                "tool_calls" | "function_call" => ModelFinishReason::ToolCalls,
                "length" => ModelFinishReason::Length,
                _ => ModelFinishReason::Stop,
            });
            state.pending_tool_call_idx = (0..state.tool_calls.len()).collect();
        }
        match choice.delta.content {
            Some(content) if !content.is_empty() => {
                state.content.push_str(&content);
                let event = ModelResponseEvent::MessageDelta(content);
                return Ok((Some(event), state));
            }
            _ => {}
        }
    }

    // A stream may end without a finish reason, its tool calls are still
    // delivered.
    if state.finished && state.finish_reason.is_none() {
        state.finish_reason = Some(if state.tool_calls.is_empty() {
            ModelFinishReason::Stop
        } else {
            ModelFinishReason::ToolCalls
        });
        state.pending_tool_call_idx = (0..state.tool_calls.len()).collect();
    }

    // The order matters: message deltas (above), then tool calls, then
    // the completion.
    if let Some(idx) = state.pending_tool_call_idx.pop_front() {
        let request = to_request(&state.tool_calls[idx]);
        return Ok((Some(ModelResponseEvent::ToolCall(request)), state));
    }

    if !state.completed_sent {
        state.completed_sent = true;
        let reason = state.finish_reason.unwrap_or(ModelFinishReason::Stop);
        return Ok((Some(ModelResponseEvent::Completed(reason)), state));
    }

    // Some servers keep sending usage chunks after the finish reason.
    while !state.finished {
        match state.sse.next_event().await {
            Ok(Some(payload)) if payload != "[DONE]" => continue,
            Ok(_) => state.finished = true,
            Err(err) => {
                return Err(Error::new(format!("{err:?}"), ErrorKind::Other));
            }
        }
    }
    Ok((None, state))
}

fn to_request(tool_call: &ToolCall) -> ToolCallRequest {
    let function = tool_call.function.as_ref();
    let arguments = function
        .and_then(|f| f.arguments.as_deref())
        .filter(|args| !args.trim().is_empty())
        .map(|args| {
            serde_json::from_str::<Value>(args)
                .unwrap_or_else(|_| Value::String(args.to_owned()))
        })
        .unwrap_or_else(|| Value::Object(Default::default()));
    ToolCallRequest {
        id: tool_call.id.clone().unwrap_or_default(),
        name: function.and_then(|f| f.name.clone()).unwrap_or_default(),
        arguments,
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use serde_json::json;

    use super::*;
    use crate::io::Chunks;

    async fn drain(
        parts: Vec<&'static [u8]>,
    ) -> (Vec<ModelResponseEvent>, Option<OpaqueMessage>) {
        let sse = Sse::new(Chunks::canned(parts));
        let mut resp = pin!(OpenAIResponse::from_sse(sse));
        let mut events = vec![];
        while let Some(event) =
            poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await.unwrap()
        {
            events.push(event);
        }
        (events, resp.make_opaque_message())
    }

    #[tokio::test]
    async fn test_tool_call_stream() {
        let (events, opaque) =
            drain(vec![
                include_bytes!("../fixtures/tool_call_stream.txt").as_slice(),
            ])
                .await;

        let tool_calls: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ModelResponseEvent::ToolCall(req) => Some(req.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(tool_calls.len(), 2);
        assert_eq!(tool_calls[0].id, "call_weather");
        assert_eq!(tool_calls[0].name, "get_weather_for_location");
        assert_eq!(tool_calls[0].arguments, json!({ "city": "Brest" }));
        assert_eq!(tool_calls[1].name, "get_surf_conditions");
        assert_eq!(tool_calls[1].arguments, json!({ "location": "La Torche" }));
        assert_eq!(
            events.last(),
            Some(&ModelResponseEvent::Completed(ModelFinishReason::ToolCalls))
        );

        let opaque = opaque.unwrap();
        assert_eq!(opaque.id(), "chatcmpl-sunny-1");
        let Some(Message::Assistant { tool_calls, .. }) = opaque.to_raw::<Message>() else {
            panic!("expected an assistant message");
        };
        assert_eq!(tool_calls.as_ref().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_text_stream_order() {
        let (events, opaque) = drain(vec![
            b"data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"12\"},\"finish_reason\":null}]}\n\n".as_slice(),
            b"data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"\xc2\xb0C.\"},\"finish_reason\":null}]}\n\n".as_slice(),
            b"data: {\"id\":\"c1\",\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n".as_slice(),
            b"data: {\"id\":\"c1\",\"choices\":[],\"usage\":{\"total_tokens\":9}}\n\n".as_slice(),
            b"data: [DONE]\n\n".as_slice(),
        ])
        .await;

        assert_eq!(
            events,
            vec![
                ModelResponseEvent::MessageDelta("12".to_owned()),
                ModelResponseEvent::MessageDelta("°C.".to_owned()),
                ModelResponseEvent::Completed(ModelFinishReason::Stop),
            ]
        );
        let opaque = opaque.unwrap();
        let Some(Message::Assistant { content, tool_calls, .. }) =
            opaque.to_raw::<Message>()
        else {
            panic!("expected an assistant message");
        };
        assert_eq!(content.as_deref(), Some("12°C."));
        assert!(tool_calls.is_none());
    }

    #[tokio::test]
    async fn test_mismatched_chunk_ids() {
        let sse = Sse::new(Chunks::canned([
            b"data: {\"id\":\"a\",\"choices\":[{\"delta\":{},\"finish_reason\":null}]}\n\n".as_slice(),
            b"data: {\"id\":\"b\",\"choices\":[{\"delta\":{\"content\":\"x\"},\"finish_reason\":null}]}\n\n".as_slice(),
        ]));
        let mut resp = pin!(OpenAIResponse::from_sse(sse));
        let result = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
        assert!(result.is_err());
        let after = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
        assert!(matches!(after, Ok(None)));
    }
}
