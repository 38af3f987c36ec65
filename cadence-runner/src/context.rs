use cadence_core::{
    ActiveStreamingTool, Agent, AgentTree, Artifacts, CallbackContext, Content, EventActions,
    InvocationContext as InvocationContextTrait, LiveRequestQueue, ReadonlyContext, RunConfig,
    Session, ToolContext,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Root context for one top-level `run`/`run_live` call. Owned by the
/// runner; agents derive branch-scoped children from it, so the whole
/// invocation shares one session, one agent tree, and one cancellation
/// flag.
pub struct InvocationContext {
    invocation_id: String,
    agent: Arc<dyn Agent>,
    tree: Arc<AgentTree>,
    session: Arc<Session>,
    user_content: Content,
    run_config: RunConfig,
    artifacts: Option<Arc<dyn Artifacts>>,
    live_queue: Option<Arc<LiveRequestQueue>>,
    ended: AtomicBool,
    actions: Mutex<EventActions>,
    streaming_tools: Mutex<Vec<ActiveStreamingTool>>,
}

impl InvocationContext {
    pub fn new(
        invocation_id: String,
        agent: Arc<dyn Agent>,
        tree: Arc<AgentTree>,
        session: Arc<Session>,
        user_content: Content,
    ) -> Self {
        Self {
            invocation_id,
            agent,
            tree,
            session,
            user_content,
            run_config: RunConfig::default(),
            artifacts: None,
            live_queue: None,
            ended: AtomicBool::new(false),
            actions: Mutex::new(EventActions::default()),
            streaming_tools: Mutex::new(Vec::new()),
        }
    }

    pub fn with_run_config(mut self, config: RunConfig) -> Self {
        self.run_config = config;
        self
    }

    pub fn with_artifacts(mut self, artifacts: Arc<dyn Artifacts>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn with_live_queue(mut self, queue: Arc<LiveRequestQueue>) -> Self {
        self.live_queue = Some(queue);
        self
    }
}

#[async_trait]
impl ReadonlyContext for InvocationContext {
    fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    fn agent_name(&self) -> &str {
        self.agent.name()
    }

    fn app_name(&self) -> &str {
        self.session.app_name()
    }

    fn user_id(&self) -> &str {
        self.session.user_id()
    }

    fn session_id(&self) -> &str {
        self.session.id()
    }

    fn branch(&self) -> &str {
        ""
    }

    fn user_content(&self) -> &Content {
        &self.user_content
    }

    fn state_get(&self, key: &str) -> Option<Value> {
        self.session.state_get(key)
    }

    fn state_all(&self) -> HashMap<String, Value> {
        self.session.state()
    }
}

#[async_trait]
impl CallbackContext for InvocationContext {
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
        self.artifacts.clone()
    }
}

#[async_trait]
impl InvocationContextTrait for InvocationContext {
    fn agent(&self) -> Arc<dyn Agent> {
        self.agent.clone()
    }

    fn agent_tree(&self) -> Arc<AgentTree> {
        self.tree.clone()
    }

    fn session(&self) -> Arc<Session> {
        self.session.clone()
    }

    fn run_config(&self) -> &RunConfig {
        &self.run_config
    }

    fn live_queue(&self) -> Option<Arc<LiveRequestQueue>> {
        self.live_queue.clone()
    }

    fn end_invocation(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }

    fn ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    fn register_streaming_tool(&self, tool: ActiveStreamingTool) {
        self.streaming_tools.lock().unwrap().push(tool);
    }

    fn streaming_tools(&self) -> Vec<ActiveStreamingTool> {
        self.streaming_tools.lock().unwrap().clone()
    }
}

/// Tool-facing view over a root context; used by callers that invoke tools
/// outside a flow (tests, manual harnesses).
pub struct StandaloneToolContext {
    invocation: Arc<dyn InvocationContextTrait>,
    function_call_id: String,
    actions: Mutex<EventActions>,
}

impl StandaloneToolContext {
    pub fn new(
        invocation: Arc<dyn InvocationContextTrait>,
        function_call_id: impl Into<String>,
    ) -> Self {
        Self {
            invocation,
            function_call_id: function_call_id.into(),
            actions: Mutex::new(EventActions::default()),
        }
    }
}

#[async_trait]
impl ReadonlyContext for StandaloneToolContext {
    fn invocation_id(&self) -> &str {
        self.invocation.invocation_id()
    }

    fn agent_name(&self) -> &str {
        self.invocation.agent_name()
    }

    fn app_name(&self) -> &str {
        self.invocation.app_name()
    }

    fn user_id(&self) -> &str {
        self.invocation.user_id()
    }

    fn session_id(&self) -> &str {
        self.invocation.session_id()
    }

    fn branch(&self) -> &str {
        self.invocation.branch()
    }

    fn user_content(&self) -> &Content {
        self.invocation.user_content()
    }

    fn state_get(&self, key: &str) -> Option<Value> {
        self.invocation.state_get(key)
    }

    fn state_all(&self) -> HashMap<String, Value> {
        self.invocation.state_all()
    }
}

#[async_trait]
impl CallbackContext for StandaloneToolContext {
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
        self.invocation.artifacts()
    }
}

#[async_trait]
impl ToolContext for StandaloneToolContext {
    fn function_call_id(&self) -> &str {
        &self.function_call_id
    }

    fn invocation(&self) -> Arc<dyn InvocationContextTrait> {
        self.invocation.clone()
    }

    fn register_streaming_tool(&self, tool: ActiveStreamingTool) {
        self.invocation.register_streaming_tool(tool);
    }
}
