use crate::base::BaseAgent;
use cadence_core::{
    AfterAgentCallback, Agent, BeforeAgentCallback, EventStream, InvocationContext, Result,
};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::select_all;
use std::sync::Arc;

/// Runs its sub-agents concurrently, interleaving their events. Each
/// sub-agent derives its own branch segment, so siblings do not observe
/// each other's in-flight history.
pub struct ParallelAgent {
    base: BaseAgent,
}

impl ParallelAgent {
    pub fn new(name: impl Into<String>, sub_agents: Vec<Arc<dyn Agent>>) -> Self {
        Self { base: BaseAgent::new(name, String::new(), sub_agents, Vec::new(), Vec::new()) }
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
impl Agent for ParallelAgent {
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
        self.base
            .run_wrapped(ctx, move |child| async move {
                let s = stream! {
                    let mut streams = Vec::new();
                    for agent in &sub_agents {
                        match agent.run(child.clone()).await {
                            Ok(events) => streams.push(events),
                            Err(e) => {
                                yield Err(e);
                                return;
                            }
                        }
                    }

                    let mut merged = select_all(streams);
                    while let Some(result) = merged.next().await {
                        let failed = result.is_err();
                        yield result;
                        if failed || child.ended() {
                            return;
                        }
                    }
                };
                Ok(Box::pin(s) as EventStream)
            })
            .await
    }
}
