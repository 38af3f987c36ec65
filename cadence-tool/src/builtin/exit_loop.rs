use cadence_core::{Result, Tool, ToolContext};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

/// Signals a loop workflow to stop iterating by setting the `escalate`
/// action on the current event.
pub struct ExitLoopTool;

#[async_trait]
impl Tool for ExitLoopTool {
    fn name(&self) -> &str {
        "exit_loop"
    }

    fn description(&self) -> &str {
        "Exits the loop. Call this when the task is complete and no further iterations are needed."
    }

    async fn execute(&self, ctx: Arc<dyn ToolContext>, _args: Value) -> Result<Value> {
        let mut actions = ctx.actions();
        actions.escalate = true;
        ctx.set_actions(actions);
        Ok(json!({ "status": "exiting loop" }))
    }
}
