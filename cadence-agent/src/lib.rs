//! # cadence-agent
//!
//! Agent implementations for the Cadence runtime:
//!
//! - [`BaseAgent`] — the callback-chaining wrapper every agent type shares:
//!   before-chain, core behavior, after-chain, branch derivation
//! - [`LlmAgent`] / [`LlmAgentBuilder`] — a model-bound agent with
//!   instructions, tools, and a flow, all resolved at invocation time
//! - The flow engine — a processor pipeline feeding the model-call /
//!   function-call loop, with transfer between agents in [`FlowKind::Auto`]
//! - Workflow agents — [`SequentialAgent`], [`LoopAgent`], [`ParallelAgent`]
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use cadence_agent::LlmAgentBuilder;
//! use std::sync::Arc;
//!
//! # fn demo(model: Arc<dyn cadence_core::Llm>) -> cadence_core::Result<()> {
//! let agent = LlmAgentBuilder::new("assistant")
//!     .description("General-purpose assistant")
//!     .model(model)
//!     .instruction("You are a helpful assistant. Answer concisely.")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod base;
mod context;
mod flow;
mod functions;
mod llm_agent;
mod workflow;

pub use base::BaseAgent;
pub use functions::TRANSFER_TOOL_NAME;
pub use llm_agent::{FlowKind, LlmAgent, LlmAgentBuilder};
pub use workflow::{DEFAULT_LOOP_MAX_ITERATIONS, LoopAgent, ParallelAgent, SequentialAgent};
