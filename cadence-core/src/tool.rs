use crate::Result;
use crate::context::ToolContext;
use serde_json::Value;
use async_trait::async_trait;
use std::sync::Arc;

/// A callable capability exposed to the model.
///
/// Anything with a name, a description, a declaration, and an invoke
/// operation satisfies the calling convention — plain functions, agents
/// wrapped as tools, and the reserved transfer tool alike.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// Description sent to the model. For long-running tools this carries a
    /// note telling the model not to re-issue a call that is still pending.
    fn enhanced_description(&self) -> String {
        if self.is_long_running() {
            format!(
                "{} NOTE: this is a long-running operation; do not call it again while a previous call is still pending.",
                self.description()
            )
        } else {
            self.description().to_string()
        }
    }

    /// Long-running tools return a pending status immediately and complete
    /// out-of-band; the flow records them instead of looping on them.
    fn is_long_running(&self) -> bool {
        false
    }

    fn parameters_schema(&self) -> Option<Value> {
        None
    }

    fn response_schema(&self) -> Option<Value> {
        None
    }

    /// JSON function declaration registered on the model request.
    fn declaration(&self) -> Value {
        let mut decl = serde_json::json!({
            "name": self.name(),
            "description": self.enhanced_description(),
        });
        if let Some(params) = self.parameters_schema() {
            decl["parameters"] = params;
        }
        if let Some(response) = self.response_schema() {
            decl["response"] = response;
        }
        decl
    }

    async fn execute(&self, ctx: Arc<dyn ToolContext>, args: Value) -> Result<Value>;
}

/// A named group of tools, resolved against the invocation context.
#[async_trait]
pub trait Toolset: Send + Sync {
    fn name(&self) -> &str;
    async fn tools(
        &self,
        ctx: Arc<dyn crate::context::ReadonlyContext>,
    ) -> Result<Vec<Arc<dyn Tool>>>;
}

pub type ToolPredicate = Box<dyn Fn(&dyn Tool) -> bool + Send + Sync>;

/// Bookkeeping for a long-running tool invocation whose call and result may
/// span multiple ticks of a live session.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveStreamingTool {
    pub name: String,
    pub args: Value,
    pub function_call_id: String,
    pub done: bool,
    pub result: Option<Value>,
}

impl ActiveStreamingTool {
    pub fn new(
        name: impl Into<String>,
        args: Value,
        function_call_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            args,
            function_call_id: function_call_id.into(),
            done: false,
            result: None,
        }
    }

    pub fn complete(&mut self, result: Value) {
        self.done = true;
        self.result = Some(result);
    }
}
