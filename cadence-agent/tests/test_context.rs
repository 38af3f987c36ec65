#![allow(dead_code)]

use cadence_core::{
    ActiveStreamingTool, Agent, AgentTree, Artifacts, CallbackContext, Content, Event,
    EventActions, EventStream, InvocationContext, LiveRequestQueue, ReadonlyContext, RunConfig,
    Session,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Root invocation context for exercising agents without a runner.
pub struct TestContext {
    session: Arc<Session>,
    tree: Arc<AgentTree>,
    agent: Arc<dyn Agent>,
    user_content: Content,
    run_config: RunConfig,
    live_queue: Option<Arc<LiveRequestQueue>>,
    ended: AtomicBool,
    actions: Mutex<EventActions>,
    streaming_tools: Mutex<Vec<ActiveStreamingTool>>,
}

impl TestContext {
    pub fn new(agent: Arc<dyn Agent>, message: &str) -> Self {
        let tree = Arc::new(AgentTree::new(agent.clone()).expect("valid agent tree"));
        Self {
            session: Arc::new(Session::new("test-app", "test-user", "test-session")),
            tree,
            agent,
            user_content: Content::new("user").with_text(message),
            run_config: RunConfig::default(),
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

    pub fn with_live_queue(mut self, queue: Arc<LiveRequestQueue>) -> Self {
        self.live_queue = Some(queue);
        self
    }
}

#[async_trait]
impl ReadonlyContext for TestContext {
    fn invocation_id(&self) -> &str {
        "inv-test"
    }

    fn agent_name(&self) -> &str {
        self.agent.name()
    }

    fn app_name(&self) -> &str {
        "test-app"
    }

    fn user_id(&self) -> &str {
        "test-user"
    }

    fn session_id(&self) -> &str {
        "test-session"
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
impl CallbackContext for TestContext {
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
        None
    }
}

#[async_trait]
impl InvocationContext for TestContext {
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

/// Drain a stream, panicking on the first error.
///
/// Appends each event to the session in yield order — the same contract
/// the runner provides — so the flow's next iteration observes the
/// previous round's calls, responses, and state deltas.
pub async fn collect_events(session: Arc<Session>, mut stream: EventStream) -> Vec<Event> {
    let mut events = Vec::new();
    while let Some(result) = stream.next().await {
        let event = result.expect("event stream should not error");
        session.append_event(&event);
        events.push(event);
    }
    events
}
