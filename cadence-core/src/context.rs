use crate::agent::{Agent, AgentTree};
use crate::event::EventActions;
use crate::live::LiveRequestQueue;
use crate::session::Session;
use crate::tool::ActiveStreamingTool;
use crate::types::{Content, Part};
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Read-only view over a running invocation, handed to instruction
/// providers and anything else that must not mutate state.
#[async_trait]
pub trait ReadonlyContext: Send + Sync {
    fn invocation_id(&self) -> &str;
    fn agent_name(&self) -> &str;
    fn app_name(&self) -> &str;
    fn user_id(&self) -> &str;
    fn session_id(&self) -> &str;
    /// Dot-path of this agent's position in the sub-agent nesting.
    fn branch(&self) -> &str;
    fn user_content(&self) -> &Content;
    fn state_get(&self, key: &str) -> Option<Value>;
    fn state_all(&self) -> HashMap<String, Value>;
}

/// Read-write view handed to callbacks and tools. Writes are recorded as a
/// pending [`EventActions`] delta attached to the resulting event — never
/// applied to session state directly.
#[async_trait]
pub trait CallbackContext: ReadonlyContext {
    /// Record a state write into the pending delta.
    fn state_set(&self, key: String, value: Value);

    /// Snapshot of the pending actions recorded so far.
    fn actions(&self) -> EventActions;

    fn set_actions(&self, actions: EventActions);

    fn artifacts(&self) -> Option<Arc<dyn Artifacts>>;
}

/// View handed to an executing tool.
#[async_trait]
pub trait ToolContext: CallbackContext {
    /// Correlation id of the function call being serviced.
    fn function_call_id(&self) -> &str;

    /// The invocation this tool call belongs to. Lets composing tools (an
    /// agent exposed as a tool) dispatch sub-invocations.
    fn invocation(&self) -> Arc<dyn InvocationContext>;

    /// Opt this call into long-running bookkeeping instead of blocking the
    /// flow loop on its completion.
    fn register_streaming_tool(&self, tool: ActiveStreamingTool);
}

/// Full control over one running invocation. Created once per top-level
/// `run`/`run_live` call; borrows the session and the agent tree, owns the
/// cancellation flag.
#[async_trait]
pub trait InvocationContext: CallbackContext {
    /// The agent this invocation was dispatched to.
    fn agent(&self) -> Arc<dyn Agent>;

    /// Arena over the full agent tree, for transfer and model resolution.
    fn agent_tree(&self) -> Arc<AgentTree>;

    fn session(&self) -> Arc<Session>;

    fn run_config(&self) -> &RunConfig;

    /// Present only for live invocations.
    fn live_queue(&self) -> Option<Arc<LiveRequestQueue>>;

    /// Short-circuit the remaining pipeline. Every loop checks `ended()` at
    /// each yield boundary and stops producing events without raising.
    fn end_invocation(&self);

    fn ended(&self) -> bool;

    fn register_streaming_tool(&self, tool: ActiveStreamingTool);

    fn streaming_tools(&self) -> Vec<ActiveStreamingTool>;
}

#[async_trait]
pub trait Artifacts: Send + Sync {
    async fn save(&self, name: &str, data: &Part) -> Result<i64>;
    async fn load(&self, name: &str) -> Result<Part>;
    async fn list(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingMode {
    None,
    Sse,
}

/// Per-invocation limits and modes.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub streaming_mode: StreamingMode,
    /// Hard ceiling on model calls within one invocation; exceeding it is
    /// fatal (`CadenceError::LlmCallsLimitExceeded`).
    pub max_llm_calls: u32,
}

pub const DEFAULT_MAX_LLM_CALLS: u32 = 500;

impl Default for RunConfig {
    fn default() -> Self {
        Self { streaming_mode: StreamingMode::None, max_llm_calls: DEFAULT_MAX_LLM_CALLS }
    }
}

impl RunConfig {
    pub fn with_max_llm_calls(mut self, max: u32) -> Self {
        self.max_llm_calls = max;
        self
    }

    pub fn with_streaming_mode(mut self, mode: StreamingMode) -> Self {
        self.streaming_mode = mode;
        self
    }
}
