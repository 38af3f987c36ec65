//! Workflow agents: deterministic composition of sub-agents without a
//! model call of their own.

mod loop_agent;
mod parallel_agent;
mod sequential_agent;

pub use loop_agent::{DEFAULT_LOOP_MAX_ITERATIONS, LoopAgent};
pub use parallel_agent::ParallelAgent;
pub use sequential_agent::SequentialAgent;
