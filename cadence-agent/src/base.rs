//! The callback-chaining wrapper shared by every agent type.
//!
//! [`BaseAgent`] owns the agent's identity, its sub-agents, and the
//! canonical before/after callback lists. `run_wrapped` derives a child
//! context (one new branch segment), runs the before-chain, delegates to
//! the agent-type-specific behavior, then runs the after-chain:
//!
//! - Before-chain: the first callback yielding non-empty content produces
//!   the sole output event; the core behavior and the after-chain are both
//!   skipped.
//! - After-chain: the first callback yielding non-empty content appends one
//!   trailing event; it augments the stream, it never replaces it.
//!
//! Callback errors propagate uncaught; the cancellation flag is checked at
//! every yield boundary.

use crate::context::{CallbackRecorder, ChildContext};
use cadence_core::{
    AfterAgentCallback, BeforeAgentCallback, CallbackContext, Content, Event, EventActions,
    EventStream, InvocationContext, Result,
};
use async_stream::stream;
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;

pub struct BaseAgent {
    name: String,
    description: String,
    sub_agents: Vec<Arc<dyn cadence_core::Agent>>,
    before_callbacks: Arc<Vec<BeforeAgentCallback>>,
    after_callbacks: Arc<Vec<AfterAgentCallback>>,
}

impl BaseAgent {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        sub_agents: Vec<Arc<dyn cadence_core::Agent>>,
        before_callbacks: Vec<BeforeAgentCallback>,
        after_callbacks: Vec<AfterAgentCallback>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            sub_agents,
            before_callbacks: Arc::new(before_callbacks),
            after_callbacks: Arc::new(after_callbacks),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn sub_agents(&self) -> &[Arc<dyn cadence_core::Agent>] {
        &self.sub_agents
    }

    /// Construction-time only: panics once the agent has been shared.
    pub fn push_before_callback(&mut self, callback: BeforeAgentCallback) {
        Arc::get_mut(&mut self.before_callbacks)
            .expect("before_callbacks not yet shared")
            .push(callback);
    }

    /// Construction-time only: panics once the agent has been shared.
    pub fn push_after_callback(&mut self, callback: AfterAgentCallback) {
        Arc::get_mut(&mut self.after_callbacks)
            .expect("after_callbacks not yet shared")
            .push(callback);
    }

    /// Run `body` between the before- and after-callback chains, on a child
    /// context whose branch gains this agent's name as a segment.
    pub async fn run_wrapped<F, Fut>(
        &self,
        parent_ctx: Arc<dyn InvocationContext>,
        body: F,
    ) -> Result<EventStream>
    where
        F: FnOnce(Arc<dyn InvocationContext>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<EventStream>> + Send + 'static,
    {
        let ctx: Arc<dyn InvocationContext> =
            Arc::new(ChildContext::derive(parent_ctx, &self.name));
        let agent_name = self.name.clone();
        let before_callbacks = self.before_callbacks.clone();
        let after_callbacks = self.after_callbacks.clone();

        let s = stream! {
            if ctx.ended() {
                return;
            }

            // ===== BEFORE AGENT CALLBACKS =====
            for callback in before_callbacks.as_ref() {
                let recorder = Arc::new(CallbackRecorder::new(ctx.clone()));
                let result = callback(recorder.clone() as Arc<dyn CallbackContext>).await;
                let actions = recorder.actions();
                if actions.end_invocation {
                    ctx.end_invocation();
                }
                match result {
                    Ok(Some(content)) if !content.parts.is_empty() => {
                        // First non-empty content wins: it becomes the sole
                        // output and the rest of the chain, the core
                        // behavior, and the after-chain are skipped.
                        yield Ok(agent_event(&ctx, &agent_name, Some(content), actions));
                        return;
                    }
                    Ok(_) => {
                        if actions != EventActions::default() {
                            yield Ok(agent_event(&ctx, &agent_name, None, actions));
                        }
                        if ctx.ended() {
                            return;
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }

            // ===== CORE BEHAVIOR =====
            let mut inner = match body(ctx.clone()).await {
                Ok(stream) => stream,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            while let Some(result) = inner.next().await {
                let failed = result.is_err();
                yield result;
                if failed || ctx.ended() {
                    return;
                }
            }

            // ===== AFTER AGENT CALLBACKS =====
            for callback in after_callbacks.as_ref() {
                let recorder = Arc::new(CallbackRecorder::new(ctx.clone()));
                let result = callback(recorder.clone() as Arc<dyn CallbackContext>).await;
                let actions = recorder.actions();
                if actions.end_invocation {
                    ctx.end_invocation();
                }
                match result {
                    Ok(Some(content)) if !content.parts.is_empty() => {
                        yield Ok(agent_event(&ctx, &agent_name, Some(content), actions));
                        break;
                    }
                    Ok(_) => {
                        if actions != EventActions::default() {
                            yield Ok(agent_event(&ctx, &agent_name, None, actions));
                        }
                        if ctx.ended() {
                            return;
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(s))
    }
}

/// Build an event authored by this agent on the current branch.
pub(crate) fn agent_event(
    ctx: &Arc<dyn InvocationContext>,
    author: &str,
    content: Option<Content>,
    actions: EventActions,
) -> Event {
    let mut event = Event::new(ctx.invocation_id(), author)
        .with_branch(ctx.branch())
        .with_actions(actions);
    if let Some(content) = content {
        event.set_content(content);
    }
    event
}
