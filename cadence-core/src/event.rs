use crate::model::LlmResponse;
use crate::types::{Content, Part};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Author name used for events carrying user input.
pub const AUTHOR_USER: &str = "user";

/// One atomic, attributable occurrence in a session.
///
/// The embedded [`LlmResponse`] is flattened so `partial`, `turn_complete`,
/// `interrupted`, and the error fields ride along with the content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub invocation_id: String,
    /// Dot-path locating the authoring agent in the sub-agent nesting.
    pub branch: String,
    /// Agent name, or `user`.
    pub author: String,
    #[serde(flatten)]
    pub llm_response: LlmResponse,
    pub actions: EventActions,
    /// Correlation ids of long-running tool calls started by this event.
    #[serde(default)]
    pub long_running_tool_ids: Vec<String>,
}

/// Side effects attached to an event. Session state is mutated exclusively
/// by folding `state_delta` in event order; replaying the log reconstructs
/// the same state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventActions {
    pub state_delta: HashMap<String, serde_json::Value>,
    pub artifact_delta: HashMap<String, i64>,
    pub transfer_to_agent: Option<String>,
    pub escalate: bool,
    pub end_invocation: bool,
}

impl EventActions {
    /// Merge another delta into this one; later writes win per key.
    pub fn merge(&mut self, other: EventActions) {
        self.state_delta.extend(other.state_delta);
        self.artifact_delta.extend(other.artifact_delta);
        if other.transfer_to_agent.is_some() {
            self.transfer_to_agent = other.transfer_to_agent;
        }
        self.escalate |= other.escalate;
        self.end_invocation |= other.end_invocation;
    }
}

impl Event {
    pub fn new(invocation_id: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            invocation_id: invocation_id.into(),
            branch: String::new(),
            author: author.into(),
            llm_response: LlmResponse::default(),
            actions: EventActions::default(),
            long_running_tool_ids: Vec::new(),
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_content(mut self, content: Content) -> Self {
        self.llm_response.content = Some(content);
        self
    }

    pub fn with_response(mut self, response: LlmResponse) -> Self {
        self.llm_response = response;
        self
    }

    pub fn with_actions(mut self, actions: EventActions) -> Self {
        self.actions = actions;
        self
    }

    pub fn content(&self) -> Option<&Content> {
        self.llm_response.content.as_ref()
    }

    pub fn set_content(&mut self, content: Content) {
        self.llm_response.content = Some(content);
    }

    pub fn is_partial(&self) -> bool {
        self.llm_response.partial
    }

    /// Function-call parts carried by this event, in order.
    pub fn function_calls(&self) -> Vec<&Part> {
        match self.content() {
            Some(content) => content.function_calls(),
            None => Vec::new(),
        }
    }

    /// Function-response parts carried by this event, in order.
    pub fn function_responses(&self) -> Vec<&Part> {
        match self.content() {
            Some(content) => {
                content.parts.iter().filter(|p| matches!(p, Part::FunctionResponse { .. })).collect()
            }
            None => Vec::new(),
        }
    }
}
