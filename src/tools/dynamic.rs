//! Runtime-discovered tools, such as those listed by an MCP server.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::set::ToolSpec;
use super::tool::{Tool, ToolExecutionContext};
use crate::error::RelayError;
use crate::schema::ValidatedSchema;

/// A tool discovered at runtime (e.g., from MCP server).
#[derive(Debug, Clone)]
pub struct DynamicTool {
    pub name: String,
    pub description: String,
    pub parameters: ValidatedSchema,
}

/// An open connection that can discover and execute tools.
#[async_trait]
pub trait DynamicToolProvider: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<DynamicTool>, RelayError>;

    async fn execute_tool(
        &self,
        name: &str,
        args: &Value,
        ctx: &ToolExecutionContext,
    ) -> Result<Value, RelayError>;

    /// Release the connection. Called exactly once per run that opened it.
    async fn close(&self) -> Result<(), RelayError>;
}

/// Opens a fresh [`DynamicToolProvider`] connection for one run.
#[async_trait]
pub trait ToolProviderConnector: Send + Sync {
    /// Short label used in logs.
    fn label(&self) -> String;

    async fn connect(&self) -> Result<Arc<dyn DynamicToolProvider>, RelayError>;
}

/// Adapter that exposes a [`DynamicTool`] through the core [`Tool`] trait.
pub struct DynamicToolAdapter {
    provider: Arc<dyn DynamicToolProvider>,
    name: String,
    description: String,
    parameters: ValidatedSchema,
}

impl DynamicToolAdapter {
    /// Create a new adapter for a discovered tool.
    pub fn new(provider: Arc<dyn DynamicToolProvider>, tool: DynamicTool) -> Self {
        Self {
            provider,
            name: tool.name,
            description: tool.description,
            parameters: tool.parameters,
        }
    }
}

#[async_trait]
impl Tool for DynamicToolAdapter {
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
        self.provider.execute_tool(&self.name, args, ctx).await
    }
}

/// List a provider's tools as locally executable specs.
pub async fn discover_tool_specs(
    provider: &Arc<dyn DynamicToolProvider>,
) -> Result<Vec<ToolSpec>, RelayError> {
    let tools = provider.list_tools().await?;
    Ok(tools
        .into_iter()
        .map(|tool| ToolSpec::local(Arc::new(DynamicToolAdapter::new(provider.clone(), tool))))
        .collect())
}

/// Convert a discovered wire schema, falling back to an empty object when it
/// cannot be represented.
pub fn discovered_schema(tool_name: &str, schema: &Value) -> ValidatedSchema {
    match crate::schema::to_schema(schema, true) {
        Ok(schema) => schema,
        Err(e) => {
            warn!(tool = tool_name, error = %e, "unsupported discovered tool schema, accepting any object");
            ValidatedSchema::empty_object()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct MockProvider {
        last_call: Mutex<Option<String>>,
    }

    #[async_trait]
    impl DynamicToolProvider for MockProvider {
        async fn list_tools(&self) -> Result<Vec<DynamicTool>, RelayError> {
            Ok(vec![DynamicTool {
                name: "dynamic".into(),
                description: "dynamic tool".into(),
                parameters: ValidatedSchema::empty_object(),
            }])
        }

        async fn execute_tool(
            &self,
            name: &str,
            _args: &Value,
            _ctx: &ToolExecutionContext,
        ) -> Result<Value, RelayError> {
            let mut last_call = self.last_call.lock().expect("lock should succeed");
            *last_call = Some(name.to_string());
            Ok(serde_json::json!({ "ok": true }))
        }

        async fn close(&self) -> Result<(), RelayError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn discovered_specs_delegate_execute_to_provider() {
        let provider = Arc::new(MockProvider {
            last_call: Mutex::new(None),
        });
        let provider_dyn: Arc<dyn DynamicToolProvider> = provider.clone();

        let specs = discover_tool_specs(&provider_dyn).await.expect("discovery should succeed");
        assert_eq!(specs.len(), 1);
        assert!(specs[0].is_local());

        let result = specs[0]
            .executor
            .as_ref()
            .expect("executor")
            .execute(&serde_json::json!({}), &ToolExecutionContext::default())
            .await
            .expect("execute should succeed");

        assert_eq!(result["ok"], true);
        let last_call = provider.last_call.lock().expect("lock should succeed").clone();
        assert_eq!(last_call.as_deref(), Some("dynamic"));
    }

    #[test]
    fn unsupported_discovered_schema_falls_back_to_empty_object() {
        let schema = discovered_schema("odd", &serde_json::json!({"type": "array"}));
        assert_eq!(schema, ValidatedSchema::empty_object());
    }
}
