use crate::{
    CallbackContext, Content, LlmRequest, LlmResponse, ReadonlyContext, Result, ToolContext,
};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

// Agent callbacks: first callback returning non-empty Content wins.
// Before-chain: the content replaces the agent's behavior entirely.
// After-chain: the content is appended as one trailing event.
pub type BeforeAgentCallback = Box<
    dyn Fn(Arc<dyn CallbackContext>) -> Pin<Box<dyn Future<Output = Result<Option<Content>>> + Send>>
        + Send
        + Sync,
>;
pub type AfterAgentCallback = BeforeAgentCallback;

/// Outcome of a before-model callback: keep going with a (possibly
/// modified) request, or skip the model call with a ready response.
pub enum BeforeModelResult {
    Continue(LlmRequest),
    Skip(LlmResponse),
}

pub type BeforeModelCallback = Box<
    dyn Fn(
            Arc<dyn CallbackContext>,
            LlmRequest,
        ) -> Pin<Box<dyn Future<Output = Result<BeforeModelResult>> + Send>>
        + Send
        + Sync,
>;

pub type AfterModelCallback = Box<
    dyn Fn(
            Arc<dyn CallbackContext>,
            LlmResponse,
        ) -> Pin<Box<dyn Future<Output = Result<Option<LlmResponse>>> + Send>>
        + Send
        + Sync,
>;

// Tool callbacks wrap each function invocation: (tool name, args, context).
// A before callback returning Some(result) substitutes for execution; an
// after callback returning Some(result) rewrites the tool's result.
pub type BeforeToolCallback = Box<
    dyn Fn(
            Arc<dyn ToolContext>,
            String,
            Value,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Value>>> + Send>>
        + Send
        + Sync,
>;

pub type AfterToolCallback = Box<
    dyn Fn(
            Arc<dyn ToolContext>,
            String,
            Value,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Value>>> + Send>>
        + Send
        + Sync,
>;

// Instruction providers: evaluated fresh on every invocation so they can
// reflect current session state.
pub type InstructionProvider = Box<
    dyn Fn(Arc<dyn ReadonlyContext>) -> Pin<Box<dyn Future<Output = Result<String>> + Send>>
        + Send
        + Sync,
>;
pub type GlobalInstructionProvider = InstructionProvider;
