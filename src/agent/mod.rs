//! AG-UI agent: turns run requests into ordered lifecycle events.
//!
//! ```no_run
//! use agui_relay::agent::{AgentConfig, BuiltInAgent, Message, RunAgentInput};
//! use agui_relay::models::LanguageModel;
//! use futures::StreamExt;
//!
//! # async fn example() -> agui_relay::error::Result<()> {
//! let model: LanguageModel = "openai/gpt-4o".parse()?;
//! let agent = BuiltInAgent::new(
//!     AgentConfig::builder()
//!         .model(model)
//!         .prompt("You are a helpful assistant.")
//!         .build(),
//! );
//!
//! let mut input = RunAgentInput::new("thread-1", "run-1");
//! input.messages.push(Message::user("Hello!"));
//!
//! let mut events = agent.run(input);
//! while let Some(event) = events.next().await {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod convert;
pub mod events;
pub mod input;
pub mod overrides;
pub mod runner;
pub mod state_machine;

pub use config::{AgentConfig, AgentFileConfig};
pub use convert::{NormalizePolicy, NormalizedRequest};
pub use events::{AgUiEvent, EventRole};
pub use input::{ContextItem, InputContentPart, InputTool, Message, RunAgentInput, ToolCallRef, UserContent};
pub use overrides::{OverridableProperty, RunParameters};
pub use runner::{BuiltInAgent, RunAbortHandle, RunOutcome, RunStream, EVENT_CHANNEL_CAPACITY};
pub use state_machine::{EventTranslator, Terminal, ToolCallState};
