//! Tool trait and closure-based tool wrapper.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RelayError;
use crate::schema::ValidatedSchema;

/// Context available during tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolExecutionContext {
    pub tool_call_id: String,
    pub thread_id: Option<String>,
    pub run_id: Option<String>,
}

/// A locally executable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Parameter schema the arguments are validated against before execution.
    fn parameters(&self) -> &ValidatedSchema;

    async fn execute(&self, args: &Value, ctx: &ToolExecutionContext) -> Result<Value, RelayError>;
}

type ToolHandler = dyn Fn(Value, ToolExecutionContext) -> Pin<Box<dyn Future<Output = Result<Value, RelayError>> + Send>>
    + Send
    + Sync;

/// Closure-based tool for quick tool creation.
///
/// ```
/// use agui_relay::schema::ValidatedSchema;
/// use agui_relay::tools::AgentTool;
///
/// let echo = AgentTool::new(
///     "echo",
///     "Echo the input back",
///     ValidatedSchema::object(vec![("text".into(), ValidatedSchema::string())]),
///     |args, _ctx| async move { Ok(args) },
/// );
/// # let _ = echo;
/// ```
#[derive(Clone)]
pub struct AgentTool {
    name: String,
    description: String,
    parameters: ValidatedSchema,
    handler: Arc<ToolHandler>,
}

impl AgentTool {
    /// Create a tool from a closure.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ValidatedSchema,
        handler: F,
    ) -> Self
    where
        F: Fn(Value, ToolExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RelayError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
        }
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &ValidatedSchema {
        &self.parameters
    }

    async fn execute(&self, args: &Value, ctx: &ToolExecutionContext) -> Result<Value, RelayError> {
        (self.handler)(args.clone(), ctx.clone()).await
    }
}

impl std::fmt::Debug for AgentTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}
