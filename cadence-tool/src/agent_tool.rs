//! AgentTool — use agents as callable tools.
//!
//! Wraps an [`Agent`] so a coordinator can invoke it through the ordinary
//! function-calling path: the wrapped agent runs on a derived context, its
//! final text becomes the tool result, and its state/artifact deltas are
//! forwarded to the parent through the tool context.

use cadence_core::{
    ActiveStreamingTool, Agent, AgentTree, Artifacts, CallbackContext, Content, Event,
    EventActions, InvocationContext, LiveRequestQueue, ReadonlyContext, Result, RunConfig,
    Session, Tool, ToolContext,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub struct AgentTool {
    agent: Arc<dyn Agent>,
    input_schema: Option<Value>,
}

impl AgentTool {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent, input_schema: None }
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    fn default_parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "request": {
                    "type": "string",
                    "description": format!("The request to send to the {} agent", self.agent.name())
                }
            },
            "required": ["request"]
        })
    }

    fn extract_request(&self, args: &Value) -> String {
        if let Some(request) = args.get("request").and_then(|v| v.as_str()) {
            return request.to_string();
        }
        match args {
            Value::String(s) => s.clone(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }

    /// The last non-partial text the sub-agent produced.
    fn extract_response(events: &[Event]) -> Value {
        for event in events.iter().rev() {
            if event.is_partial() {
                continue;
            }
            if let Some(content) = event.content() {
                let text = content.merged_text();
                if !text.is_empty() {
                    return json!({ "response": text });
                }
            }
        }
        json!({ "response": "" })
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        self.agent.name()
    }

    fn description(&self) -> &str {
        self.agent.description()
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(self.input_schema.clone().unwrap_or_else(|| self.default_parameters_schema()))
    }

    #[tracing::instrument(skip(self, ctx, args), fields(agent_tool = %self.agent.name()))]
    async fn execute(&self, ctx: Arc<dyn ToolContext>, args: Value) -> Result<Value> {
        let request_text = self.extract_request(&args);
        let user_content = Content::new("user").with_text(&request_text);

        let sub_ctx: Arc<dyn InvocationContext> = Arc::new(SubInvocationContext::new(
            ctx.invocation(),
            self.agent.clone(),
            user_content,
        )?);

        let mut event_stream = self.agent.run(sub_ctx).await?;

        let mut events = Vec::new();
        let mut state_delta = HashMap::new();
        let mut artifact_delta = HashMap::new();
        while let Some(result) = event_stream.next().await {
            let event = result?;
            state_delta.extend(event.actions.state_delta.clone());
            artifact_delta.extend(event.actions.artifact_delta.clone());
            events.push(event);
        }

        if !state_delta.is_empty() || !artifact_delta.is_empty() {
            let mut actions = ctx.actions();
            actions.state_delta.extend(state_delta);
            actions.artifact_delta.extend(artifact_delta);
            ctx.set_actions(actions);
        }

        tracing::debug!(events = events.len(), "agent tool completed");
        Ok(Self::extract_response(&events))
    }
}

/// Derived invocation for the wrapped agent: same session and cancellation
/// flag as the parent, its own branch segment, tree, and user content.
struct SubInvocationContext {
    parent: Arc<dyn InvocationContext>,
    agent: Arc<dyn Agent>,
    tree: Arc<AgentTree>,
    user_content: Content,
    branch: String,
    actions: Mutex<EventActions>,
}

impl SubInvocationContext {
    fn new(
        parent: Arc<dyn InvocationContext>,
        agent: Arc<dyn Agent>,
        user_content: Content,
    ) -> Result<Self> {
        let tree = Arc::new(AgentTree::new(agent.clone())?);
        let branch = if parent.branch().is_empty() {
            agent.name().to_string()
        } else {
            format!("{}.{}", parent.branch(), agent.name())
        };
        Ok(Self {
            parent,
            agent,
            tree,
            user_content,
            branch,
            actions: Mutex::new(EventActions::default()),
        })
    }
}

#[async_trait]
impl ReadonlyContext for SubInvocationContext {
    fn invocation_id(&self) -> &str {
        self.parent.invocation_id()
    }

    fn agent_name(&self) -> &str {
        self.agent.name()
    }

    fn app_name(&self) -> &str {
        self.parent.app_name()
    }

    fn user_id(&self) -> &str {
        self.parent.user_id()
    }

    fn session_id(&self) -> &str {
        self.parent.session_id()
    }

    fn branch(&self) -> &str {
        &self.branch
    }

    fn user_content(&self) -> &Content {
        &self.user_content
    }

    fn state_get(&self, key: &str) -> Option<Value> {
        self.parent.state_get(key)
    }

    fn state_all(&self) -> HashMap<String, Value> {
        self.parent.state_all()
    }
}

#[async_trait]
impl CallbackContext for SubInvocationContext {
    fn state_set(&self, key: String, value: Value) {
        self.actions.lock().unwrap().state_delta.insert(key, value);
    }

    fn actions(&self) -> EventActions {
        self.actions.lock().unwrap().clone()
    }

    fn set_actions(&self, actions: EventActions) {
        *self.actions.lock().unwrap() = actions;
    }

    fn artifacts(&self) -> Option<Arc<dyn Artifacts>> {
        self.parent.artifacts()
    }
}

#[async_trait]
impl InvocationContext for SubInvocationContext {
    fn agent(&self) -> Arc<dyn Agent> {
        self.agent.clone()
    }

    fn agent_tree(&self) -> Arc<AgentTree> {
        self.tree.clone()
    }

    fn session(&self) -> Arc<Session> {
        self.parent.session()
    }

    fn run_config(&self) -> &RunConfig {
        self.parent.run_config()
    }

    fn live_queue(&self) -> Option<Arc<LiveRequestQueue>> {
        None
    }

    fn end_invocation(&self) {
        self.parent.end_invocation();
    }

    fn ended(&self) -> bool {
        self.parent.ended()
    }

    fn register_streaming_tool(&self, tool: ActiveStreamingTool) {
        self.parent.register_streaming_tool(tool);
    }

    fn streaming_tools(&self) -> Vec<ActiveStreamingTool> {
        self.parent.streaming_tools()
    }
}
