//! Live (bidirectional) flow: consumes a [`LiveRequestQueue`] instead of a
//! single user content and receives a stream of response fragments over an
//! [`LlmConnection`].
//!
//! Partial text fragments accumulate; one merged non-partial event is
//! emitted whenever accumulation ends — a non-text fragment arrives, the
//! turn completes, or the stream is interrupted — and the accumulator
//! resets. `turn_complete` yields a terminal event and ends the receive
//! loop; `interrupted` flushes pending text before surfacing the
//! interruption.

use crate::base::agent_event;
use crate::functions;
use crate::llm_agent::LlmAgentInner;
use cadence_core::{
    CadenceError, Content, Event, EventActions, EventStream, InvocationContext, Llm,
    LlmConnection, LlmRequest, Part, Tool,
};
use async_stream::stream;
use std::collections::HashMap;
use std::sync::Arc;

use super::processors;

pub(crate) fn run_live_flow(
    agent: Arc<LlmAgentInner>,
    ctx: Arc<dyn InvocationContext>,
) -> EventStream {
    let s = stream! {
        let kind = agent.flow_kind(&ctx);
        let model = match agent.resolve_model(&ctx) {
            Ok(model) => model,
            Err(e) => {
                yield Err(e);
                return;
            }
        };
        let tools = match agent.resolve_tools(&ctx).await {
            Ok(tools) => tools,
            Err(e) => {
                yield Err(e);
                return;
            }
        };
        let tool_map: HashMap<String, Arc<dyn Tool>> =
            tools.iter().map(|t| (t.name().to_string(), t.clone())).collect();

        let Some(queue) = ctx.live_queue() else {
            yield Err(CadenceError::Agent(
                "live invocation requires a live request queue".to_string(),
            ));
            return;
        };

        // ===== BUILD_REQUEST =====
        let mut request = LlmRequest::new(model.name());
        for processor in processors::pipeline(kind) {
            match processor.process(&ctx, &agent, &tools, &mut request).await {
                Ok(events) => {
                    for event in events {
                        yield Ok(event);
                        if ctx.ended() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        let history = request.contents.clone();
        let connection: Arc<dyn LlmConnection> = match model.connect(request).await {
            Ok(connection) => Arc::from(connection),
            Err(e) => {
                yield Err(e);
                return;
            }
        };
        if let Err(e) = connection.send_history(history).await {
            yield Err(e);
            return;
        }

        // Queue → connection forwarding runs beside the receive loop; the
        // queue is safe to feed from outside the cooperative loop.
        let forward_connection = connection.clone();
        let forward_queue = queue.clone();
        let forward = tokio::spawn(async move {
            while let Some(request) = forward_queue.get().await {
                if request.close {
                    let _ = forward_connection.close().await;
                    break;
                }
                if let Some(content) = request.content {
                    if forward_connection.send_content(content).await.is_err() {
                        break;
                    }
                }
                if let Some(blob) = request.blob {
                    if forward_connection.send_realtime(blob).await.is_err() {
                        break;
                    }
                }
            }
        });

        let mut accumulator = TextAccumulator::new();

        // ===== RECEIVE LOOP =====
        while let Some(result) = connection.receive().await {
            if ctx.ended() {
                break;
            }
            let mut response = match result {
                Ok(response) => response,
                Err(e) => {
                    yield Err(e);
                    break;
                }
            };

            if response.interrupted {
                if let Some(merged) = accumulator.flush() {
                    yield Ok(merged_text_event(&ctx, agent.name(), merged));
                }
                let mut event = agent_event(&ctx, agent.name(), None, EventActions::default());
                event.llm_response = response;
                yield Ok(event);
                continue;
            }

            if response.turn_complete {
                if let Some(merged) = accumulator.flush() {
                    yield Ok(merged_text_event(&ctx, agent.name(), merged));
                }
                let mut event = agent_event(&ctx, agent.name(), None, EventActions::default());
                event.llm_response = response;
                yield Ok(event);
                break;
            }

            let Some(content) = response.content.clone() else {
                continue;
            };

            let text_only = content.parts.iter().all(|p| matches!(p, Part::Text { .. }));
            if response.partial && text_only {
                accumulator.push(&content.merged_text());
                let mut event = agent_event(&ctx, agent.name(), None, EventActions::default());
                event.llm_response = response;
                yield Ok(event);
                continue;
            }

            // A non-text (or non-partial) fragment ends accumulation.
            if let Some(merged) = accumulator.flush() {
                yield Ok(merged_text_event(&ctx, agent.name(), merged));
            }

            if let Some(content) = response.content.as_mut() {
                for part in content.parts.iter_mut() {
                    if let Part::FunctionCall { id, .. } = part {
                        if id.is_none() {
                            *id = Some(functions::new_call_id());
                        }
                    }
                }
            }
            let calls = functions::extract_calls(response.content.as_ref());

            let mut event = agent_event(&ctx, agent.name(), None, EventActions::default());
            event.llm_response = response;
            event.long_running_tool_ids = calls
                .iter()
                .filter(|call| {
                    tool_map.get(&call.name).map(|t| t.is_long_running()).unwrap_or(false)
                })
                .map(|call| call.id.clone())
                .collect();
            yield Ok(event);
            if ctx.ended() {
                break;
            }

            if !calls.is_empty() {
                let outcome =
                    match functions::execute_function_calls(&ctx, &agent, &tool_map, calls).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            yield Err(e);
                            break;
                        }
                    };
                let response_content = outcome.event.content().cloned();
                yield Ok(outcome.event);
                if outcome.end_invocation {
                    ctx.end_invocation();
                    break;
                }
                if let Some(content) = response_content {
                    if let Err(e) = connection.send_content(content).await {
                        yield Err(e);
                        break;
                    }
                }
            }
        }

        forward.abort();
    };
    Box::pin(s)
}

/// Accumulates partial text fragments until a flush trigger.
pub(crate) struct TextAccumulator {
    buffer: String,
}

impl TextAccumulator {
    pub(crate) fn new() -> Self {
        Self { buffer: String::new() }
    }

    pub(crate) fn push(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    /// The merged content so far, resetting the accumulator. `None` when
    /// nothing accumulated.
    pub(crate) fn flush(&mut self) -> Option<Content> {
        if self.buffer.is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.buffer);
        Some(Content::new("model").with_text(text))
    }
}

/// The non-partial event closing one accumulated utterance.
fn merged_text_event(
    ctx: &Arc<dyn InvocationContext>,
    author: &str,
    content: Content,
) -> Event {
    agent_event(ctx, author, Some(content), EventActions::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulator_merges_fragments() {
        let mut acc = TextAccumulator::new();
        acc.push("Hel");
        acc.push("lo");
        let merged = acc.flush().unwrap();
        assert_eq!(merged.merged_text(), "Hello");
    }

    #[test]
    fn test_accumulator_resets_after_flush() {
        let mut acc = TextAccumulator::new();
        acc.push("one");
        assert!(acc.flush().is_some());
        assert!(acc.flush().is_none());

        acc.push("two");
        assert_eq!(acc.flush().unwrap().merged_text(), "two");
    }
}
