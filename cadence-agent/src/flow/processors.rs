//! Request processors: the ordered pipeline that builds an [`LlmRequest`]
//! before each model call. Each processor may mutate the shared request
//! and/or emit side-channel events.

use crate::functions::TRANSFER_TOOL_NAME;
use crate::llm_agent::{FlowKind, LlmAgentInner};
use cadence_core::{
    Agent, Content, Event, InvocationContext, LlmRequest, Part, ReadonlyContext, Result, Tool,
    inject_session_state,
};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

#[async_trait]
pub(crate) trait RequestProcessor: Send + Sync {
    async fn process(
        &self,
        ctx: &Arc<dyn InvocationContext>,
        agent: &LlmAgentInner,
        tools: &[Arc<dyn Tool>],
        request: &mut LlmRequest,
    ) -> Result<Vec<Event>>;
}

/// The pipeline for one flow kind, in execution order.
pub(crate) fn pipeline(kind: FlowKind) -> Vec<Box<dyn RequestProcessor>> {
    let mut processors: Vec<Box<dyn RequestProcessor>> = vec![
        Box::new(BasicProcessor),
        Box::new(InstructionsProcessor),
        Box::new(ContentsProcessor),
        Box::new(ToolsProcessor),
    ];
    if kind == FlowKind::Auto {
        processors.push(Box::new(TransferProcessor));
    }
    processors
}

/// Generation config and structured-output schema.
struct BasicProcessor;

#[async_trait]
impl RequestProcessor for BasicProcessor {
    async fn process(
        &self,
        _ctx: &Arc<dyn InvocationContext>,
        agent: &LlmAgentInner,
        _tools: &[Arc<dyn Tool>],
        request: &mut LlmRequest,
    ) -> Result<Vec<Event>> {
        if let Some(config) = &agent.generate_config {
            request.config = Some(config.clone());
        }
        if let Some(schema) = &agent.output_schema {
            request
                .config
                .get_or_insert_with(Default::default)
                .response_schema = Some(schema.clone());
        }
        Ok(Vec::new())
    }
}

/// Global then agent instruction, re-resolved every invocation so providers
/// and templates see current session state.
struct InstructionsProcessor;

#[async_trait]
impl RequestProcessor for InstructionsProcessor {
    async fn process(
        &self,
        ctx: &Arc<dyn InvocationContext>,
        agent: &LlmAgentInner,
        _tools: &[Arc<dyn Tool>],
        request: &mut LlmRequest,
    ) -> Result<Vec<Event>> {
        if let Some(provider) = &agent.global_instruction_provider {
            let text = provider(ctx.clone() as Arc<dyn ReadonlyContext>).await?;
            request.append_instruction(&text);
        } else if let Some(template) = &agent.global_instruction {
            let text = inject_session_state(ctx.as_ref(), template).await?;
            request.append_instruction(&text);
        }

        if let Some(provider) = &agent.instruction_provider {
            let text = provider(ctx.clone() as Arc<dyn ReadonlyContext>).await?;
            request.append_instruction(&text);
        } else if let Some(template) = &agent.instruction {
            let text = inject_session_state(ctx.as_ref(), template).await?;
            request.append_instruction(&text);
        }

        Ok(Vec::new())
    }
}

/// Session history scoped to this agent's branch, sanitized for replay to
/// the model.
struct ContentsProcessor;

#[async_trait]
impl RequestProcessor for ContentsProcessor {
    async fn process(
        &self,
        ctx: &Arc<dyn InvocationContext>,
        _agent: &LlmAgentInner,
        _tools: &[Arc<dyn Tool>],
        request: &mut LlmRequest,
    ) -> Result<Vec<Event>> {
        let branch = ctx.branch().to_string();
        let mut contents = Vec::new();
        let mut saw_user_event = false;
        for event in ctx.session().events() {
            if !event_belongs_to_branch(&branch, &event.branch) {
                continue;
            }
            if event.author == cadence_core::AUTHOR_USER {
                saw_user_event = true;
            }
            let Some(content) = event.content() else {
                continue;
            };
            if let Some(clean) = sanitize_content(content) {
                contents.push(clean);
            }
        }

        // A log without the user's turn (direct flow invocations, derived
        // sub-invocations) still needs the current user content in front.
        if !saw_user_event && !ctx.user_content().parts.is_empty() {
            contents.insert(0, ctx.user_content().clone());
        }

        request.contents.extend(contents);
        Ok(Vec::new())
    }
}

/// An event is visible to an agent when its branch is a segment-prefix of
/// the agent's branch: ancestors' and the user's events are history,
/// siblings' are not.
pub(crate) fn event_belongs_to_branch(current_branch: &str, event_branch: &str) -> bool {
    event_branch.is_empty()
        || current_branch == event_branch
        || current_branch.starts_with(&format!("{event_branch}."))
}

/// Model-bound copy of a content: correlation ids and thought markers are
/// local bookkeeping, never part of the model-visible conversation.
pub(crate) fn sanitize_content(content: &Content) -> Option<Content> {
    let parts: Vec<Part> = content
        .parts
        .iter()
        .filter(|part| !part.is_thought())
        .map(|part| match part {
            Part::FunctionCall { name, args, .. } => {
                Part::FunctionCall { name: name.clone(), args: args.clone(), id: None }
            }
            Part::FunctionResponse { name, response, .. } => {
                Part::FunctionResponse { name: name.clone(), response: response.clone(), id: None }
            }
            other => other.clone(),
        })
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(Content { role: content.role.clone(), parts })
}

/// Tool declarations from the resolved tool set.
struct ToolsProcessor;

#[async_trait]
impl RequestProcessor for ToolsProcessor {
    async fn process(
        &self,
        _ctx: &Arc<dyn InvocationContext>,
        _agent: &LlmAgentInner,
        tools: &[Arc<dyn Tool>],
        request: &mut LlmRequest,
    ) -> Result<Vec<Event>> {
        for tool in tools {
            request.add_tool_declaration(tool.name(), tool.declaration());
        }
        Ok(Vec::new())
    }
}

/// Identity instruction plus the reserved transfer declaration, describing
/// the agents this one may hand the conversation to.
struct TransferProcessor;

#[async_trait]
impl RequestProcessor for TransferProcessor {
    async fn process(
        &self,
        ctx: &Arc<dyn InvocationContext>,
        agent: &LlmAgentInner,
        _tools: &[Arc<dyn Tool>],
        request: &mut LlmRequest,
    ) -> Result<Vec<Event>> {
        let targets = transfer_targets(ctx, agent);
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let mut text = format!(
            "You are agent '{}'. {}\n\nYou may hand the conversation over to one of the following agents when they are better suited to handle the request:\n",
            agent.name(),
            agent.base.description()
        );
        for target in &targets {
            text.push_str(&format!("- {}: {}\n", target.name(), target.description()));
        }
        text.push_str(&format!(
            "\nTo hand over, call the `{TRANSFER_TOOL_NAME}` function with the target agent's name. Otherwise answer the request yourself."
        ));
        request.append_instruction(&text);

        request.add_tool_declaration(
            TRANSFER_TOOL_NAME,
            json!({
                "name": TRANSFER_TOOL_NAME,
                "description": "Transfer the conversation to another agent.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "agent_name": {
                            "type": "string",
                            "description": "The name of the agent to transfer to."
                        }
                    },
                    "required": ["agent_name"]
                }
            }),
        );
        Ok(Vec::new())
    }
}

/// Reachable hand-off targets: sub-agents, then peers and parent unless
/// disallowed by configuration.
pub(crate) fn transfer_targets(
    ctx: &Arc<dyn InvocationContext>,
    agent: &LlmAgentInner,
) -> Vec<Arc<dyn Agent>> {
    let tree = ctx.agent_tree();
    let mut targets: Vec<Arc<dyn Agent>> = agent.base.sub_agents().to_vec();
    if !agent.disallow_transfer_to_peers {
        targets.extend(tree.peers_of(agent.name()));
    }
    if !agent.disallow_transfer_to_parent {
        if let Some(parent) = tree.parent_of(agent.name()) {
            targets.push(parent);
        }
    }
    targets
}
