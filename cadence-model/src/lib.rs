//! # cadence-model
//!
//! Model-resolution infrastructure for the Cadence agent runtime:
//!
//! - [`LlmRegistry`] — explicit mapping from model-name patterns to adapter
//!   factories, constructed at process start and passed by reference
//! - [`MockLlm`] — scripted adapter for tests, recording the requests it
//!   receives
//!
//! Concrete vendor adapters implement [`cadence_core::Llm`] in their own
//! crates; the runtime only ever sees the normalized request/response types.

pub mod mock;
pub mod registry;

pub use mock::{MockLlm, MockLlmConnection};
pub use registry::LlmRegistry;

pub use cadence_core::{Llm, LlmConnection, LlmRequest, LlmResponse, LlmResponseStream};
