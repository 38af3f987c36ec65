//! # cadence-tool
//!
//! Tool infrastructure for Cadence agents:
//!
//! - [`FunctionTool`] — create tools from async Rust closures
//! - [`AgentTool`] — expose an agent as a callable tool for composition
//! - [`BasicToolset`] — group tools, optionally filtered by predicate
//! - [`ExitLoopTool`] — control flow for loop workflows
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use cadence_tool::FunctionTool;
//! use cadence_core::{ToolContext, Result};
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! async fn get_weather(_ctx: Arc<dyn ToolContext>, args: Value) -> Result<Value> {
//!     let city = args["city"].as_str().unwrap_or("Unknown");
//!     Ok(json!({ "city": city, "condition": "sunny" }))
//! }
//!
//! let tool = FunctionTool::new(
//!     "get_weather",
//!     "Get current weather for a city",
//!     get_weather,
//! );
//! ```

mod agent_tool;
pub mod builtin;
mod function_tool;
pub mod toolset;

pub use cadence_core::{Tool, ToolContext, Toolset};

pub use agent_tool::AgentTool;
pub use builtin::ExitLoopTool;
pub use function_tool::FunctionTool;
pub use toolset::{BasicToolset, name_predicate};
