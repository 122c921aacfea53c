//! Convenience re-exports for common use.

pub use crate::agent::{
    AgUiEvent, AgentConfig, BuiltInAgent, Message, OverridableProperty, RunAgentInput, RunOutcome,
};
pub use crate::config::RelayConfig;
pub use crate::error::{RelayError, Result};
pub use crate::models::{LanguageModel, ModelSpecifier, ProviderKey};
pub use crate::provider::ModelProvider;
pub use crate::schema::ValidatedSchema;
pub use crate::tools::{AgentTool, Tool, ToolProviderConnector};
pub use crate::types::{GenerationSettings, StreamPart, ToolChoice};
