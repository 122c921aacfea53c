//! Static agent configuration.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use bon::Builder;
use serde::Deserialize;

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::models::ModelSpecifier;
use crate::tools::{Tool, ToolProviderConnector};
use crate::types::{GenerationSettings, ToolChoice};

use super::convert::NormalizePolicy;
use super::overrides::OverridableProperty;

/// Defaults shared by every run of an agent. Never mutated by a run.
#[derive(Clone, Builder)]
pub struct AgentConfig {
    #[builder(into)]
    pub model: ModelSpecifier,
    /// Wins over keys from [`RelayConfig`].
    #[builder(into)]
    pub api_key: Option<String>,
    #[builder(default = 1)]
    pub max_steps: u32,
    pub tool_choice: Option<ToolChoice>,
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub stop_sequences: Option<Vec<String>>,
    pub seed: Option<u64>,
    #[builder(default = 2)]
    pub max_retries: u32,
    #[builder(into)]
    pub prompt: Option<String>,
    #[builder(default)]
    pub overridable_properties: Vec<OverridableProperty>,
    #[builder(default)]
    pub tools: Vec<Arc<dyn Tool>>,
    /// Auxiliary tool providers, connected once per run.
    #[builder(default)]
    pub tool_providers: Vec<Arc<dyn ToolProviderConnector>>,
    #[builder(default)]
    pub forward_system_messages: bool,
    #[builder(default)]
    pub forward_developer_messages: bool,
    /// Falls back to [`RelayConfig::global`].
    pub relay_config: Option<RelayConfig>,
}

impl AgentConfig {
    pub fn can_override(&self, property: OverridableProperty) -> bool {
        self.overridable_properties.contains(&property)
    }

    /// Sampling settings as configured, before overrides.
    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            max_tokens: self.max_output_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            stop_sequences: self.stop_sequences.clone(),
            presence_penalty: self.presence_penalty,
            frequency_penalty: self.frequency_penalty,
            seed: self.seed,
            tool_choice: self.tool_choice.clone(),
        }
    }

    pub fn normalize_policy(&self) -> NormalizePolicy {
        NormalizePolicy {
            forward_system_messages: self.forward_system_messages,
            forward_developer_messages: self.forward_developer_messages,
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        self.relay_config
            .clone()
            .unwrap_or_else(|| RelayConfig::global().clone())
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tools: Vec<&str> = self.tools.iter().map(|t| t.name()).collect();
        let providers: Vec<String> = self.tool_providers.iter().map(|p| p.label()).collect();
        f.debug_struct("AgentConfig")
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("max_steps", &self.max_steps)
            .field("settings", &self.generation_settings())
            .field("max_retries", &self.max_retries)
            .field("prompt", &self.prompt)
            .field("overridable_properties", &self.overridable_properties)
            .field("tools", &tools)
            .field("tool_providers", &providers)
            .field("forward_system_messages", &self.forward_system_messages)
            .field("forward_developer_messages", &self.forward_developer_messages)
            .finish()
    }
}

/// File form of [`AgentConfig`], loaded from TOML.
///
/// ```toml
/// model = "openai/gpt-4o"
/// prompt = "You are a helpful assistant."
/// overridable_properties = ["temperature", "stopSequences"]
///
/// [[mcp_servers]]
/// type = "http"
/// url = "http://localhost:8931/mcp"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentFileConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub max_steps: Option<u32>,
    pub tool_choice: Option<ToolChoice>,
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub stop_sequences: Option<Vec<String>>,
    pub seed: Option<u64>,
    pub max_retries: Option<u32>,
    pub prompt: Option<String>,
    #[serde(default)]
    pub overridable_properties: Vec<OverridableProperty>,
    #[serde(default)]
    pub forward_system_messages: bool,
    #[serde(default)]
    pub forward_developer_messages: bool,
    #[cfg(feature = "mcp")]
    #[serde(default)]
    pub mcp_servers: Vec<crate::mcp::McpServerConfig>,
}

impl AgentFileConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| RelayError::Configuration(format!("invalid agent config: {e}")))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Build an [`AgentConfig`]. In-process tools can be added to the result.
    pub fn into_config(self) -> Result<AgentConfig> {
        let model = ModelSpecifier::parse(&self.model)?;

        #[cfg(feature = "mcp")]
        let tool_providers: Vec<Arc<dyn ToolProviderConnector>> = self
            .mcp_servers
            .into_iter()
            .map(|server| Arc::new(server) as Arc<dyn ToolProviderConnector>)
            .collect();
        #[cfg(not(feature = "mcp"))]
        let tool_providers: Vec<Arc<dyn ToolProviderConnector>> = Vec::new();

        Ok(AgentConfig {
            model,
            api_key: self.api_key,
            max_steps: self.max_steps.unwrap_or(1),
            tool_choice: self.tool_choice,
            max_output_tokens: self.max_output_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            presence_penalty: self.presence_penalty,
            frequency_penalty: self.frequency_penalty,
            stop_sequences: self.stop_sequences,
            seed: self.seed,
            max_retries: self.max_retries.unwrap_or(2),
            prompt: self.prompt,
            overridable_properties: self.overridable_properties,
            tools: Vec::new(),
            tool_providers,
            forward_system_messages: self.forward_system_messages,
            forward_developer_messages: self.forward_developer_messages,
            relay_config: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LanguageModel, ProviderKey};

    #[test]
    fn builder_defaults() {
        let config = AgentConfig::builder()
            .model(LanguageModel::new(ProviderKey::Google, "gemini-2.5-flash"))
            .build();
        assert_eq!(config.max_steps, 1);
        assert_eq!(config.max_retries, 2);
        assert!(config.overridable_properties.is_empty());
        assert_eq!(config.generation_settings(), GenerationSettings::default());
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AgentConfig::builder()
            .model(LanguageModel::new(ProviderKey::OpenAi, "gpt-4o"))
            .api_key("sk-secret")
            .build();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn file_config_converts() {
        let file = AgentFileConfig::from_toml_str(
            r#"
            model = "anthropic/claude-sonnet-4.5"
            temperature = 0.2
            overridable_properties = ["temperature", "stopSequences"]
            forward_developer_messages = true
            "#,
        )
        .unwrap();
        let config = file.into_config().unwrap();

        assert!(matches!(&config.model, ModelSpecifier::Id(m) if m.provider == ProviderKey::Anthropic));
        assert_eq!(config.temperature, Some(0.2));
        assert!(config.can_override(OverridableProperty::StopSequences));
        assert!(!config.can_override(OverridableProperty::Model));
        assert!(config.normalize_policy().forward_developer_messages);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = AgentFileConfig::from_toml_str("model = \"openai/gpt-4o\"\nverbose = true").unwrap_err();
        assert!(matches!(err, RelayError::Configuration(_)));
    }

    #[test]
    fn bad_model_fails_conversion() {
        let file = AgentFileConfig::from_toml_str("model = \"gpt-4o\"").unwrap();
        assert!(file.into_config().is_err());
    }
}
