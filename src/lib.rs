//! agui-relay: stream LLM provider output as AG-UI lifecycle events.
//!
//! A [`agent::BuiltInAgent`] takes an AG-UI run request, normalizes its
//! history, tools, context and state into a provider request, streams one or
//! more model steps, and emits an ordered event stream that always starts
//! with `RUN_STARTED` and ends with at most one of `RUN_FINISHED` or
//! `RUN_ERROR`.
//!
//! Providers (OpenAI, Anthropic, Google) sit behind cargo features of the
//! same names. MCP servers can be attached as auxiliary tool providers with
//! the `mcp` feature.

pub mod agent;
pub mod config;
pub mod error;
pub mod generation;
pub mod models;
pub mod prelude;
pub mod provider;
pub mod schema;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(feature = "mcp")]
pub mod mcp;
