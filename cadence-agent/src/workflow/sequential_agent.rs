use crate::base::BaseAgent;
use cadence_core::{
    AfterAgentCallback, Agent, BeforeAgentCallback, EventStream, InvocationContext, Result,
};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

/// Runs its sub-agents in declaration order, streaming their events
/// through. Later sub-agents see earlier ones' output as session history.
pub struct SequentialAgent {
    base: BaseAgent,
}

impl SequentialAgent {
    pub fn new(name: impl Into<String>, sub_agents: Vec<Arc<dyn Agent>>) -> Self {
        Self { base: BaseAgent::new(name, String::new(), sub_agents, Vec::new(), Vec::new()) }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.base.set_description(desc);
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
impl Agent for SequentialAgent {
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
                    for agent in &sub_agents {
                        let mut events = match agent.run(child.clone()).await {
                            Ok(events) => events,
                            Err(e) => {
                                yield Err(e);
                                return;
                            }
                        };
                        while let Some(result) = events.next().await {
                            let failed = result.is_err();
                            yield result;
                            if failed || child.ended() {
                                return;
                            }
                        }
                    }
                };
                Ok(Box::pin(s) as EventStream)
            })
            .await
    }
}
