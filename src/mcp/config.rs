//! MCP server declarations.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::RelayError;
use crate::tools::dynamic::{DynamicToolProvider, ToolProviderConnector};

use super::bridge::MCPToolAdapter;
use super::client::MCPClient;

/// A remote MCP server whose tools are offered to the model.
///
/// ```toml
/// [[mcp_servers]]
/// type = "http"
/// url = "https://tools.example.com/mcp"
/// bearer_token = "secret"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpServerConfig {
    /// Streamable HTTP transport.
    Http {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bearer_token: Option<String>,
    },
}

impl McpServerConfig {
    pub fn url(&self) -> &str {
        match self {
            Self::Http { url, .. } => url,
        }
    }
}

#[async_trait]
impl ToolProviderConnector for McpServerConfig {
    fn label(&self) -> String {
        format!("mcp:{}", self.url())
    }

    async fn connect(&self) -> Result<Arc<dyn DynamicToolProvider>, RelayError> {
        let client = MCPClient::connect(self).await?;
        info!(server = self.url(), "connected MCP server");
        Ok(Arc::new(MCPToolAdapter::new(client)))
    }
}
