//! Bridge MCP tools into the relay tool system.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RelayError;
use crate::tools::dynamic::{discovered_schema, DynamicTool, DynamicToolProvider};
use crate::tools::tool::ToolExecutionContext;

use super::client::{MCPClient, MCPToolCallResult, MCPToolSchema};

#[async_trait]
trait MCPClientOps: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<MCPToolSchema>, RelayError>;
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<MCPToolCallResult, RelayError>;
    async fn close(&self) -> Result<(), RelayError>;
}

#[async_trait]
impl MCPClientOps for MCPClient {
    async fn list_tools(&self) -> Result<Vec<MCPToolSchema>, RelayError> {
        MCPClient::list_tools(self).await
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<MCPToolCallResult, RelayError> {
        MCPClient::call_tool(self, name, arguments).await
    }

    async fn close(&self) -> Result<(), RelayError> {
        MCPClient::close(self).await
    }
}

/// Adapts an MCP client to the DynamicToolProvider trait.
pub struct MCPToolAdapter {
    client: Box<dyn MCPClientOps>,
}

impl MCPToolAdapter {
    pub fn new(client: MCPClient) -> Self {
        Self {
            client: Box::new(client),
        }
    }

    #[cfg(test)]
    fn from_client_ops(client: Box<dyn MCPClientOps>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DynamicToolProvider for MCPToolAdapter {
    async fn list_tools(&self) -> Result<Vec<DynamicTool>, RelayError> {
        let tools = self.client.list_tools().await?;
        Ok(tools.into_iter().map(map_mcp_tool_to_dynamic).collect())
    }

    async fn execute_tool(
        &self,
        name: &str,
        args: &Value,
        _ctx: &ToolExecutionContext,
    ) -> Result<Value, RelayError> {
        let result = self.client.call_tool(name, args.clone()).await?;
        Ok(result.into_value_or_text())
    }

    async fn close(&self) -> Result<(), RelayError> {
        self.client.close().await
    }
}

fn map_mcp_tool_to_dynamic(tool: MCPToolSchema) -> DynamicTool {
    DynamicTool {
        parameters: discovered_schema(&tool.name, &tool.input_schema),
        description: tool.description.unwrap_or_default(),
        name: tool.name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::schema::SchemaKind;

    struct MockClientOps {
        list_tools_result: Result<Vec<MCPToolSchema>, String>,
        call_tool_results: Mutex<VecDeque<Result<MCPToolCallResult, RelayError>>>,
        closes: AtomicUsize,
    }

    impl MockClientOps {
        fn new(calls: Vec<Result<MCPToolCallResult, RelayError>>) -> Self {
            Self {
                list_tools_result: Ok(Vec::new()),
                call_tool_results: Mutex::new(calls.into()),
                closes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MCPClientOps for MockClientOps {
        async fn list_tools(&self) -> Result<Vec<MCPToolSchema>, RelayError> {
            match &self.list_tools_result {
                Ok(tools) => Ok(tools.clone()),
                Err(message) => Err(RelayError::Provider {
                    provider: "mcp".into(),
                    message: message.clone(),
                }),
            }
        }

        async fn call_tool(&self, _name: &str, _arguments: Value) -> Result<MCPToolCallResult, RelayError> {
            self.call_tool_results
                .lock()
                .expect("lock should succeed")
                .pop_front()
                .unwrap_or_else(|| Err(RelayError::Stream("missing mock call_tool result".into())))
        }

        async fn close(&self) -> Result<(), RelayError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn map_mcp_tool_to_dynamic_converts_schema() {
        let dynamic = map_mcp_tool_to_dynamic(MCPToolSchema {
            name: "search".into(),
            description: Some("query index".into()),
            input_schema: json!({
                "type": "object",
                "properties": { "q": { "type": "string" } },
                "required": ["q"]
            }),
        });

        assert_eq!(dynamic.name, "search");
        assert_eq!(dynamic.description, "query index");
        let SchemaKind::Object { properties } = &dynamic.parameters.kind else {
            panic!("expected object schema");
        };
        assert_eq!(properties[0].0, "q");
        assert!(properties[0].1.required);
    }

    #[tokio::test]
    async fn execute_tool_returns_structured_or_text_output() {
        let adapter = MCPToolAdapter::from_client_ops(Box::new(MockClientOps::new(vec![Ok(
            MCPToolCallResult {
                structured_content: None,
                text_content: Some("42 results".into()),
                content: Vec::new(),
            },
        )])));

        let out = adapter
            .execute_tool("search", &json!({"q": "rust"}), &ToolExecutionContext::default())
            .await
            .expect("execute should succeed");
        assert_eq!(out, json!("42 results"));
    }

    #[tokio::test]
    async fn execute_tool_propagates_tool_error_without_panic() {
        let adapter = MCPToolAdapter::from_client_ops(Box::new(MockClientOps::new(vec![Err(
            RelayError::ToolExecution {
                tool_name: "search".into(),
                message: "downstream tool failure".into(),
            },
        )])));

        let err = adapter
            .execute_tool("search", &json!({"q": "rust"}), &ToolExecutionContext::default())
            .await
            .expect_err("tool errors should be propagated");

        assert!(matches!(
            err,
            RelayError::ToolExecution { tool_name, message }
            if tool_name == "search" && message.contains("downstream tool failure")
        ));
    }

    #[tokio::test]
    async fn list_tools_error_is_a_provider_error() {
        let mut ops = MockClientOps::new(Vec::new());
        ops.list_tools_result = Err("server unavailable".into());
        let adapter = MCPToolAdapter::from_client_ops(Box::new(ops));
        let err = adapter.list_tools().await.expect_err("listing should fail");
        assert!(matches!(err, RelayError::Provider { provider, .. } if provider == "mcp"));
    }
}
