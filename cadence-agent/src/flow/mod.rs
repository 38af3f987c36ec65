//! The model-call state machine.
//!
//! One turn per agent runs BUILD_REQUEST → CALL_MODEL, then either stops
//! (no function calls) or executes the calls, appends their responses, and
//! calls the model again. The loop ends when a response carries no
//! function calls, when every call targets a long-running tool, or —
//! fatally — when the invocation's model-call budget is exhausted.

pub(crate) mod live;
pub(crate) mod processors;

use crate::base::agent_event;
use crate::context::CallbackRecorder;
use crate::functions;
use crate::llm_agent::{FlowKind, LlmAgentInner};
use cadence_core::{
    Agent, BeforeModelResult, CadenceError, CallbackContext, EventActions, EventStream,
    InvocationContext, Llm, LlmRequest, LlmResponse, Part, StreamingMode, Tool,
};
use async_stream::stream;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) use live::run_live_flow;

pub(crate) fn run_flow(agent: Arc<LlmAgentInner>, ctx: Arc<dyn InvocationContext>) -> EventStream {
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
        let processors = processors::pipeline(kind);
        let streaming = ctx.run_config().streaming_mode == StreamingMode::Sse;
        let limit = ctx.run_config().max_llm_calls;
        let mut llm_calls: u32 = 0;

        // Request history is rebuilt from the session log each iteration.
        // The consumer appends every yielded event before polling again, so
        // by the time this loop resumes, the previous round's calls and
        // responses are already in the log.
        'turn: loop {
            if ctx.ended() {
                return;
            }

            // ===== BUILD_REQUEST =====
            let mut request = LlmRequest::new(model.name());
            for processor in &processors {
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
            llm_calls += 1;
            if llm_calls > limit {
                yield Err(CadenceError::LlmCallsLimitExceeded { limit });
                return;
            }

            // ===== BEFORE MODEL CALLBACKS =====
            let mut skip_response: Option<LlmResponse> = None;
            for callback in agent.before_model_callbacks.as_ref() {
                let recorder = Arc::new(CallbackRecorder::new(ctx.clone()));
                match callback(recorder as Arc<dyn CallbackContext>, request.clone()).await {
                    Ok(BeforeModelResult::Continue(updated)) => request = updated,
                    Ok(BeforeModelResult::Skip(response)) => {
                        skip_response = Some(response);
                        break;
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }

            // ===== CALL_MODEL =====
            let mut final_response: Option<LlmResponse> = None;
            if let Some(response) = skip_response {
                final_response = Some(response);
            } else {
                tracing::debug!(model = %model.name(), call = llm_calls, "calling model");
                let mut response_stream =
                    match model.generate_content(request.clone(), streaming).await {
                        Ok(stream) => stream,
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    };

                while let Some(chunk) = response_stream.next().await {
                    let mut chunk = match chunk {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    };

                    // ===== AFTER MODEL CALLBACKS (first Some wins) =====
                    for callback in agent.after_model_callbacks.as_ref() {
                        let recorder = Arc::new(CallbackRecorder::new(ctx.clone()));
                        match callback(recorder as Arc<dyn CallbackContext>, chunk.clone()).await {
                            Ok(Some(updated)) => {
                                chunk = updated;
                                break;
                            }
                            Ok(None) => continue,
                            Err(e) => {
                                yield Err(e);
                                return;
                            }
                        }
                    }

                    if chunk.partial {
                        let mut event =
                            agent_event(&ctx, agent.name(), None, EventActions::default());
                        event.llm_response = chunk;
                        yield Ok(event);
                        if ctx.ended() {
                            return;
                        }
                        continue;
                    }

                    // First non-partial response closes this model call;
                    // adapters aggregate the streamed turn into it.
                    final_response = Some(chunk);
                    break;
                }
            }

            let Some(mut response) = final_response else {
                yield Err(CadenceError::Model(
                    "model stream ended without a final response".to_string(),
                ));
                return;
            };

            // Adapter-reported failure: surface as a visible event, end the
            // invocation.
            if response.is_error() {
                tracing::warn!(
                    code = response.error_code.as_deref().unwrap_or("UNKNOWN"),
                    "model returned an error response"
                );
                let mut event = agent_event(&ctx, agent.name(), None, EventActions::default());
                event.llm_response = response;
                yield Ok(event);
                return;
            }

            // Correlation ids are issued the moment calls are detected, so
            // events always carry them.
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

            let mut actions = EventActions::default();
            if calls.is_empty() {
                if let (Some(key), Some(content)) = (&agent.output_key, response.content.as_ref())
                {
                    let text = content.merged_text();
                    if !text.is_empty() {
                        actions.state_delta.insert(key.clone(), serde_json::Value::String(text));
                    }
                }
            }

            let mut event = agent_event(&ctx, agent.name(), None, actions);
            event.llm_response = response.clone();
            event.long_running_tool_ids = calls
                .iter()
                .filter(|call| {
                    tool_map.get(&call.name).map(|t| t.is_long_running()).unwrap_or(false)
                })
                .map(|call| call.id.clone())
                .collect();
            yield Ok(event);
            if ctx.ended() {
                return;
            }

            if calls.is_empty() {
                break 'turn;
            }
            if kind == FlowKind::Single {
                // Single flow stops after one model exchange; any requested
                // calls are left to the caller.
                break 'turn;
            }

            // ===== EXECUTE_FUNCTIONS =====
            let outcome =
                match functions::execute_function_calls(&ctx, &agent, &tool_map, calls).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

            yield Ok(outcome.event);
            if outcome.end_invocation {
                ctx.end_invocation();
                return;
            }
            if ctx.ended() {
                return;
            }

            if let Some(target) = outcome.transfer_to {
                match dispatch_transfer(&ctx, &agent, &target).await {
                    Ok(mut sub_stream) => {
                        while let Some(result) = sub_stream.next().await {
                            let failed = result.is_err();
                            yield result;
                            if failed || ctx.ended() {
                                return;
                            }
                        }
                        return;
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }

            if outcome.escalate {
                break 'turn;
            }
            if outcome.all_long_running {
                // Results arrive out-of-band; do not loop on pending calls.
                break 'turn;
            }
        }
    };
    Box::pin(s)
}

/// Resolve a transfer target among this agent's reachable set and dispatch
/// the remainder of the invocation to its own flow, on a branch derived
/// from the current context.
async fn dispatch_transfer(
    ctx: &Arc<dyn InvocationContext>,
    agent: &LlmAgentInner,
    target: &str,
) -> cadence_core::Result<EventStream> {
    let reachable = processors::transfer_targets(ctx, agent);
    let target_agent = reachable
        .iter()
        .find(|a| a.name() == target)
        .cloned()
        .ok_or_else(|| {
            CadenceError::Agent(format!(
                "agent {} cannot transfer to unreachable agent {target}",
                agent.name()
            ))
        })?;
    tracing::info!(from = %agent.name(), to = %target, "transferring invocation");
    target_agent.run(ctx.clone()).await
}
