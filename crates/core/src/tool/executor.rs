use std::collections::HashMap;

use futures_util::future::join_all;
use pier_model::{ModelTool, ToolCallRequest};
use tracing::Instrument;

use crate::tool::{
    BoxedToolFuture, Error, ToolContext, ToolObject, ToolResult,
};

/// An executor that handles tool call requests from the model.
pub struct Executor {
    tools: HashMap<String, Box<dyn ToolObject>>,
    // Registration order, so definitions are stable across requests.
    order: Vec<String>,
}

impl Executor {
    pub fn with_tools(tools: Vec<Box<dyn ToolObject>>) -> Self {
        let mut tool_map = HashMap::with_capacity(tools.len());
        let mut order = Vec::with_capacity(tools.len());
        for tool in tools {
            let name = tool.name().to_owned();
            if tool_map.insert(name.clone(), tool).is_some() {
                warn!("tool `{name}` registered twice, keeping the last one");
            } else {
                order.push(name);
            }
        }
        Self {
            tools: tool_map,
            order,
        }
    }

    pub fn definitions(&self) -> Vec<ModelTool> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    /// Runs all requests concurrently. Results come back in request order,
    /// one per request, unknown tools included.
    pub async fn run(
        &self,
        requests: &[ToolCallRequest],
        ctx: &ToolContext,
    ) -> Vec<ToolResult> {
        let futures = requests.iter().map(|req| {
            let fut: BoxedToolFuture = match self.tools.get(&req.name) {
                Some(tool) => {
                    trace!("spawning a tool ({}) with args: {:?}", req.id, req.arguments);
                    tool.execute(req.arguments.clone(), ctx.clone())
                }
                None => {
                    warn!("tool not found: {}", req.name);
                    let err = Error::not_found()
                        .with_reason(format!("unknown tool `{}`", req.name));
                    Box::pin(std::future::ready(Err(err)))
                }
            };
            fut.instrument(debug_span!("tool", name = %req.name, id = %req.id))
        });
        join_all(futures).await
    }
}
