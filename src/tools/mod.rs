//! Tool system for function calling.

pub mod dynamic;
pub mod set;
pub mod state;
pub mod tool;

pub use dynamic::{DynamicTool, DynamicToolAdapter, DynamicToolProvider, ToolProviderConnector};
pub use set::{ToolSet, ToolSpec};
pub use state::{STATE_DELTA_TOOL, STATE_SNAPSHOT_TOOL};
pub use tool::{AgentTool, Tool, ToolExecutionContext};
