//! Context wrappers used while an invocation runs: branch-deriving child
//! contexts for sub-agent dispatch and fresh pending-action recorders for
//! each callback or tool run. All of them delegate to the parent context,
//! so the invocation keeps one session, one agent tree, and one
//! cancellation flag.

use cadence_core::{
    ActiveStreamingTool, Agent, AgentTree, Artifacts, CallbackContext, Content, EventActions,
    InvocationContext, LiveRequestQueue, ReadonlyContext, RunConfig, Session, ToolContext,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Join a parent branch with one agent-name segment.
pub(crate) fn child_branch(parent_branch: &str, agent_name: &str) -> String {
    if parent_branch.is_empty() {
        agent_name.to_string()
    } else {
        format!("{parent_branch}.{agent_name}")
    }
}

/// Invocation view for one agent in the tree: same invocation as the
/// parent, one more branch segment.
pub(crate) struct ChildContext {
    parent: Arc<dyn InvocationContext>,
    agent_name: String,
    branch: String,
    actions: Mutex<EventActions>,
}

impl ChildContext {
    pub(crate) fn derive(parent: Arc<dyn InvocationContext>, agent_name: &str) -> Self {
        let branch = child_branch(parent.branch(), agent_name);
        Self {
            parent,
            agent_name: agent_name.to_string(),
            branch,
            actions: Mutex::new(EventActions::default()),
        }
    }
}

#[async_trait]
impl ReadonlyContext for ChildContext {
    fn invocation_id(&self) -> &str {
        self.parent.invocation_id()
    }

    fn agent_name(&self) -> &str {
        &self.agent_name
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
        self.parent.user_content()
    }

    fn state_get(&self, key: &str) -> Option<Value> {
        self.parent.state_get(key)
    }

    fn state_all(&self) -> HashMap<String, Value> {
        self.parent.state_all()
    }
}

#[async_trait]
impl CallbackContext for ChildContext {
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
impl InvocationContext for ChildContext {
    fn agent(&self) -> Arc<dyn Agent> {
        self.parent
            .agent_tree()
            .get(&self.agent_name)
            .unwrap_or_else(|| self.parent.agent())
    }

    fn agent_tree(&self) -> Arc<AgentTree> {
        self.parent.agent_tree()
    }

    fn session(&self) -> Arc<Session> {
        self.parent.session()
    }

    fn run_config(&self) -> &RunConfig {
        self.parent.run_config()
    }

    fn live_queue(&self) -> Option<Arc<LiveRequestQueue>> {
        self.parent.live_queue()
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

/// Fresh pending-action recorder handed to one callback run. Writes land in
/// the recorder, are harvested into the resulting event's actions, and never
/// touch session state directly.
pub(crate) struct CallbackRecorder {
    invocation: Arc<dyn InvocationContext>,
    actions: Mutex<EventActions>,
}

impl CallbackRecorder {
    pub(crate) fn new(invocation: Arc<dyn InvocationContext>) -> Self {
        Self { invocation, actions: Mutex::new(EventActions::default()) }
    }
}

#[async_trait]
impl ReadonlyContext for CallbackRecorder {
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
        // Reads see pending writes from this same run before session state.
        if let Some(value) = self.actions.lock().unwrap().state_delta.get(key) {
            return Some(value.clone());
        }
        self.invocation.state_get(key)
    }

    fn state_all(&self) -> HashMap<String, Value> {
        let mut all = self.invocation.state_all();
        all.extend(self.actions.lock().unwrap().state_delta.clone());
        all
    }
}

#[async_trait]
impl CallbackContext for CallbackRecorder {
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

/// Recorder handed to one executing tool, carrying the call's correlation
/// id.
pub(crate) struct FunctionToolContext {
    recorder: CallbackRecorder,
    function_call_id: String,
}

impl FunctionToolContext {
    pub(crate) fn new(
        invocation: Arc<dyn InvocationContext>,
        function_call_id: impl Into<String>,
    ) -> Self {
        Self {
            recorder: CallbackRecorder::new(invocation),
            function_call_id: function_call_id.into(),
        }
    }
}

#[async_trait]
impl ReadonlyContext for FunctionToolContext {
    fn invocation_id(&self) -> &str {
        self.recorder.invocation_id()
    }

    fn agent_name(&self) -> &str {
        self.recorder.agent_name()
    }

    fn app_name(&self) -> &str {
        self.recorder.app_name()
    }

    fn user_id(&self) -> &str {
        self.recorder.user_id()
    }

    fn session_id(&self) -> &str {
        self.recorder.session_id()
    }

    fn branch(&self) -> &str {
        self.recorder.branch()
    }

    fn user_content(&self) -> &Content {
        self.recorder.user_content()
    }

    fn state_get(&self, key: &str) -> Option<Value> {
        self.recorder.state_get(key)
    }

    fn state_all(&self) -> HashMap<String, Value> {
        self.recorder.state_all()
    }
}

#[async_trait]
impl CallbackContext for FunctionToolContext {
    fn state_set(&self, key: String, value: Value) {
        self.recorder.state_set(key, value);
    }

    fn actions(&self) -> EventActions {
        self.recorder.actions()
    }

    fn set_actions(&self, actions: EventActions) {
        self.recorder.set_actions(actions);
    }

    fn artifacts(&self) -> Option<Arc<dyn Artifacts>> {
        self.recorder.artifacts()
    }
}

#[async_trait]
impl ToolContext for FunctionToolContext {
    fn function_call_id(&self) -> &str {
        &self.function_call_id
    }

    fn invocation(&self) -> Arc<dyn InvocationContext> {
        self.recorder.invocation.clone()
    }

    fn register_streaming_tool(&self, tool: ActiveStreamingTool) {
        self.recorder.invocation.register_streaming_tool(tool);
    }
}
