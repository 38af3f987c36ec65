//! # cadence-runner
//!
//! Execution runtime for Cadence agents.
//!
//! - [`Runner`] — drives one conversational turn end-to-end: session
//!   lookup, user-event recording, root context construction, event
//!   persistence
//! - [`InvocationContext`] — the concrete root context implementation
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use cadence_runner::{Runner, RunnerConfig};
//! use cadence_session::InMemorySessionService;
//! use std::sync::Arc;
//!
//! # fn demo(agent: Arc<dyn cadence_core::Agent>) -> cadence_core::Result<()> {
//! let runner = Runner::new(RunnerConfig {
//!     app_name: "my_app".to_string(),
//!     agent,
//!     session_service: Arc::new(InMemorySessionService::new()),
//!     artifact_service: None,
//! })?;
//! # Ok(())
//! # }
//! ```

mod context;
mod runner;

pub use context::{InvocationContext, StandaloneToolContext};
pub use runner::{Runner, RunnerConfig};

pub use cadence_core::{RunConfig, StreamingMode};
