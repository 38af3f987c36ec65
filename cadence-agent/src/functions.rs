//! Function-calling executor.
//!
//! Detects function-call parts in a model response, resolves them against
//! the agent's tool set, executes them concurrently, and synthesizes one
//! `tool`-role event carrying a response part per call. Sibling calls in a
//! single response have no ordering dependency, so they are dispatched
//! together; results are collected in call order, which makes event order —
//! not wall-clock completion — the serialization point for state deltas.

use crate::base::agent_event;
use crate::context::FunctionToolContext;
use crate::llm_agent::LlmAgentInner;
use cadence_core::{
    ActiveStreamingTool, AfterToolCallback, BeforeToolCallback, Content, Event, EventActions,
    InvocationContext, Part, Result, Tool, ToolContext,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Reserved tool name the model uses to hand the invocation to another
/// agent.
pub const TRANSFER_TOOL_NAME: &str = "transfer_to_agent";

/// Issue a fresh correlation id for a function call the adapter did not
/// label. Process-unique, therefore unique within any invocation.
pub(crate) fn new_call_id() -> String {
    format!("fc-{}", Uuid::new_v4())
}

/// One detected function call. The id is always populated by the flow
/// before execution starts.
#[derive(Debug, Clone)]
pub(crate) struct FunctionCall {
    pub name: String,
    pub args: Value,
    pub id: String,
}

pub(crate) fn extract_calls(content: Option<&Content>) -> Vec<FunctionCall> {
    let Some(content) = content else {
        return Vec::new();
    };
    content
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::FunctionCall { name, args, id } => Some(FunctionCall {
                name: name.clone(),
                args: args.clone(),
                id: id.clone().unwrap_or_else(new_call_id),
            }),
            _ => None,
        })
        .collect()
}

pub(crate) struct FunctionsOutcome {
    /// One merged `tool`-role event: a response part per call, in call
    /// order, with the tools' combined actions.
    pub event: Event,
    pub transfer_to: Option<String>,
    pub end_invocation: bool,
    pub escalate: bool,
    /// Every call in this round targeted a long-running tool; the loop
    /// stops and results arrive out-of-band.
    pub all_long_running: bool,
}

pub(crate) async fn execute_function_calls(
    ctx: &Arc<dyn InvocationContext>,
    agent: &LlmAgentInner,
    tools: &HashMap<String, Arc<dyn Tool>>,
    calls: Vec<FunctionCall>,
) -> Result<FunctionsOutcome> {
    let call_futures = calls
        .iter()
        .map(|call| {
            run_one(
                ctx.clone(),
                agent.before_tool_callbacks.clone(),
                agent.after_tool_callbacks.clone(),
                tools.get(&call.name).cloned(),
                call.clone(),
            )
        })
        .collect::<Vec<_>>();

    // Fire all, await all; collection order is call order.
    let results = futures::future::join_all(call_futures).await;

    let mut parts = Vec::new();
    let mut merged = EventActions::default();
    let mut long_running_ids = Vec::new();
    let mut all_long_running = !calls.is_empty();
    for result in results {
        let completed = result?;
        parts.push(completed.part);
        merged.merge(completed.actions);
        if completed.long_running {
            long_running_ids.push(completed.id);
        } else {
            all_long_running = false;
        }
    }

    let transfer_to = merged.transfer_to_agent.clone();
    let end_invocation = merged.end_invocation;
    let escalate = merged.escalate;

    let mut event =
        agent_event(ctx, agent.name(), Some(Content::function_responses(parts)), merged);
    event.long_running_tool_ids = long_running_ids;

    Ok(FunctionsOutcome { event, transfer_to, end_invocation, escalate, all_long_running })
}

struct CompletedCall {
    part: Part,
    actions: EventActions,
    long_running: bool,
    id: String,
}

async fn run_one(
    ctx: Arc<dyn InvocationContext>,
    before_callbacks: Arc<Vec<BeforeToolCallback>>,
    after_callbacks: Arc<Vec<AfterToolCallback>>,
    tool: Option<Arc<dyn Tool>>,
    call: FunctionCall,
) -> Result<CompletedCall> {
    // The reserved transfer tool never executes; it records the hand-off
    // target for the flow to dispatch.
    if call.name == TRANSFER_TOOL_NAME {
        let target = call.args.get("agent_name").and_then(|v| v.as_str()).unwrap_or_default();
        let mut actions = EventActions::default();
        actions.transfer_to_agent = Some(target.to_string());
        let part = Part::function_response(
            TRANSFER_TOOL_NAME,
            json!({ "status": "transferring", "agent_name": target }),
        )
        .with_id(&call.id);
        return Ok(CompletedCall { part, actions, long_running: false, id: call.id });
    }

    let Some(tool) = tool else {
        tracing::warn!(tool = %call.name, "model requested unknown tool");
        let part = Part::function_response(
            &call.name,
            json!({ "error": format!("Tool {} not found", call.name) }),
        )
        .with_id(&call.id);
        return Ok(CompletedCall {
            part,
            actions: EventActions::default(),
            long_running: false,
            id: call.id,
        });
    };

    let tool_ctx: Arc<dyn ToolContext> =
        Arc::new(FunctionToolContext::new(ctx.clone(), call.id.clone()));

    // Before-tool chain: the first Some substitutes for execution.
    let mut result: Option<Value> = None;
    for callback in before_callbacks.as_ref() {
        match callback(tool_ctx.clone(), call.name.clone(), call.args.clone()).await? {
            Some(value) => {
                result = Some(value);
                break;
            }
            None => continue,
        }
    }

    // A failing tool is recovered into an error payload the model can read;
    // the loop keeps going.
    let mut value = match result {
        Some(value) => value,
        None => match tool.execute(tool_ctx.clone(), call.args.clone()).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "tool execution failed");
                json!({ "error": e.to_string() })
            }
        },
    };

    // After-tool chain: the first Some rewrites the result.
    for callback in after_callbacks.as_ref() {
        match callback(tool_ctx.clone(), call.name.clone(), value.clone()).await? {
            Some(updated) => {
                value = updated;
                break;
            }
            None => continue,
        }
    }

    let long_running = tool.is_long_running();
    if long_running {
        ctx.register_streaming_tool(ActiveStreamingTool::new(
            &call.name,
            call.args.clone(),
            &call.id,
        ));
    }

    Ok(CompletedCall {
        part: Part::function_response(&call.name, value).with_id(&call.id),
        actions: tool_ctx.actions(),
        long_running,
        id: call.id,
    })
}
