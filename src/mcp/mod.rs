//! Model Context Protocol (MCP) servers as auxiliary tool providers.

pub mod bridge;
pub mod client;
pub mod config;

pub use bridge::MCPToolAdapter;
pub use client::MCPClient;
pub use config::McpServerConfig;
