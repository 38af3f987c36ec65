use crate::base::BaseAgent;
use cadence_core::{
    AfterAgentCallback, Agent, BeforeAgentCallback, EventStream, InvocationContext, Result,
};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

/// Default maximum iterations for LoopAgent when none is specified.
/// Prevents runaway loops from consuming unbounded resources.
pub const DEFAULT_LOOP_MAX_ITERATIONS: u32 = 1000;

/// Runs its sub-agents repeatedly until one escalates or the iteration cap
/// is reached.
pub struct LoopAgent {
    base: BaseAgent,
    max_iterations: u32,
}

impl LoopAgent {
    pub fn new(name: impl Into<String>, sub_agents: Vec<Arc<dyn Agent>>) -> Self {
        Self {
            base: BaseAgent::new(name, String::new(), sub_agents, Vec::new(), Vec::new()),
            max_iterations: DEFAULT_LOOP_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn before_callback(mut self, callback: BeforeAgentCallback) -> Self {
        self.base.push_before_callback(callback);
        self
    }

    pub fn after_callback(mut self, callback: AfterAgentCallback) -> Self {
        self.base.push_after_callback(callback);
        self
    }
}

#[async_trait]
impl Agent for LoopAgent {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn description(&self) -> &str {
        self.base.description()
    }

    fn sub_agents(&self) -> &[Arc<dyn Agent>] {
        self.base.sub_agents()
    }

    async fn run(&self, ctx: Arc<dyn InvocationContext>) -> Result<EventStream> {
        let sub_agents = self.base.sub_agents().to_vec();
        let max_iterations = self.max_iterations;
        self.base
            .run_wrapped(ctx, move |child| async move {
                let s = stream! {
                    let mut remaining = max_iterations;
                    'outer: loop {
                        for agent in &sub_agents {
                            let mut events = match agent.run(child.clone()).await {
                                Ok(events) => events,
                                Err(e) => {
                                    yield Err(e);
                                    return;
                                }
                            };
                            let mut should_exit = false;
                            while let Some(result) = events.next().await {
                                match result {
                                    Ok(event) => {
                                        if event.actions.escalate {
                                            should_exit = true;
                                        }
                                        yield Ok(event);
                                        if child.ended() {
                                            return;
                                        }
                                    }
                                    Err(e) => {
                                        yield Err(e);
                                        return;
                                    }
                                }
                            }
                            if should_exit {
                                break 'outer;
                            }
                        }
                        remaining -= 1;
                        if remaining == 0 {
                            break;
                        }
                    }
                };
                Ok(Box::pin(s) as EventStream)
            })
            .await
    }
}
