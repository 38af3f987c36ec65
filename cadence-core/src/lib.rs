//! # cadence-core
//!
//! Core traits and types for the Cadence agent runtime.
//!
//! ## Overview
//!
//! This crate provides the foundational abstractions shared by every other
//! Cadence crate:
//!
//! - [`Agent`] — the fundamental trait for all agents, plus the [`AgentTree`]
//!   arena used for transfer and model resolution
//! - [`Tool`] / [`Toolset`] — the calling convention for model-invocable
//!   capabilities
//! - [`Session`] — the append-only event log and its materialized state
//! - [`Event`] — one atomic occurrence in a session, streamed as agents run
//! - [`ReadonlyContext`] / [`CallbackContext`] / [`ToolContext`] /
//!   [`InvocationContext`] — capability views over a running invocation,
//!   layered by mutation rights
//! - [`Llm`] / [`LlmRequest`] / [`LlmResponse`] — the model adapter seam
//! - [`LiveRequestQueue`] — the hand-off queue feeding live invocations
//! - [`CadenceError`] / [`Result`] — unified error handling
//!
//! ## State management
//!
//! Session state is mutated exclusively by folding event deltas, so a replay
//! of the event log reconstructs identical state. Keys use typed prefixes:
//!
//! - `user:` — user-scoped values (persist across sessions)
//! - `app:` — application-wide values
//! - `temp:` — turn-scoped scratch, dropped at append time

pub mod agent;
pub mod callbacks;
pub mod context;
pub mod error;
pub mod event;
pub mod instruction_template;
pub mod live;
pub mod model;
pub mod session;
pub mod tool;
pub mod types;

pub use agent::{Agent, AgentTree, EventStream};
pub use callbacks::{
    AfterAgentCallback, AfterModelCallback, AfterToolCallback, BeforeAgentCallback,
    BeforeModelCallback, BeforeModelResult, BeforeToolCallback, GlobalInstructionProvider,
    InstructionProvider,
};
pub use context::{
    Artifacts, CallbackContext, DEFAULT_MAX_LLM_CALLS, InvocationContext, ReadonlyContext,
    RunConfig, StreamingMode, ToolContext,
};
pub use error::{CadenceError, Result};
pub use event::{AUTHOR_USER, Event, EventActions};
pub use instruction_template::inject_session_state;
pub use live::{LiveRequest, LiveRequestQueue};
pub use model::{
    Blob, FinishReason, GenerateContentConfig, Llm, LlmConnection, LlmRequest, LlmResponse,
    LlmResponseStream, UsageMetadata,
};
pub use session::{
    KEY_PREFIX_APP, KEY_PREFIX_TEMP, KEY_PREFIX_USER, Session, StateMap,
};
pub use tool::{ActiveStreamingTool, Tool, ToolPredicate, Toolset};
pub use types::{Content, MAX_INLINE_DATA_SIZE, Part, ROLE_MODEL, ROLE_TOOL, ROLE_USER};
