//! Model provider trait and implementations.

pub mod http;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "anthropic")]
pub mod anthropic;

#[cfg(feature = "google")]
pub mod google;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::models::{LanguageModel, ProviderKey};
use crate::types::{GenerationSettings, ModelMessage, StreamPart};

/// Stream of parts for a single model step.
pub type PartStream = BoxStream<'static, Result<StreamPart, RelayError>>;

/// A request for one model step.
#[derive(Debug, Clone, Default)]
pub struct ProviderRequest {
    pub messages: Vec<ModelMessage>,
    pub settings: GenerationSettings,
    pub tools: Vec<ToolDefinition>,
}

/// Tool definition sent to the provider API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Core trait implemented by all model providers.
///
/// A provider performs exactly one model step per call. The returned stream
/// yields text, tool-input and tool-call parts and ends with
/// [`StreamPart::FinishStep`]. Dropping the stream abandons the request.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g., "openai", "google").
    fn provider_name(&self) -> &str;
    /// The model ID this provider instance serves.
    fn model_id(&self) -> &str;

    /// Open a streamed step. Errors returned here happen before any part
    /// was produced and may be retried.
    async fn stream_step(&self, request: &ProviderRequest) -> Result<PartStream, RelayError>;
}

/// Create a provider for the given model.
///
/// An explicit `api_key` wins over the key stored in `config`.
#[allow(unused_variables)]
pub fn create_provider(
    model: &LanguageModel,
    config: &RelayConfig,
    api_key: Option<&str>,
) -> Result<Arc<dyn ModelProvider>, RelayError> {
    let key = || {
        api_key
            .map(str::to_string)
            .or_else(|| config.get_api_key(model.provider))
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                RelayError::Configuration(format!(
                    "Missing {} for model \"{model}\"",
                    model.provider.api_key_env()
                ))
            })
    };
    let base_url = config.get_base_url(model.provider);

    debug!(provider = %model.provider, model_id = %model.model_id, "resolving model");

    match model.provider {
        #[cfg(feature = "openai")]
        ProviderKey::OpenAi => Ok(Arc::new(openai::OpenAiProvider::new(
            model.model_id.clone(),
            key()?,
            base_url,
        ))),
        #[cfg(feature = "anthropic")]
        ProviderKey::Anthropic => Ok(Arc::new(anthropic::AnthropicProvider::new(
            model.model_id.clone(),
            key()?,
            base_url,
        ))),
        #[cfg(feature = "google")]
        ProviderKey::Google => Ok(Arc::new(google::GoogleProvider::new(
            model.model_id.clone(),
            key()?,
            base_url,
        ))),
        #[allow(unreachable_patterns)]
        _ => Err(RelayError::Configuration(format!(
            "Provider for model \"{model}\" not enabled via feature flags"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "openai")]
    #[test]
    fn explicit_key_wins_over_config() {
        let config = RelayConfig::new();
        let model: LanguageModel = "openai/gpt-4o".parse().unwrap();
        let provider = create_provider(&model, &config, Some("sk-explicit")).unwrap();
        assert_eq!(provider.provider_name(), "openai");
        assert_eq!(provider.model_id(), "gpt-4o");
    }

    #[cfg(feature = "anthropic")]
    #[test]
    fn missing_key_is_a_configuration_error() {
        let config = RelayConfig::new();
        let model: LanguageModel = "anthropic/claude-sonnet-4.5".parse().unwrap();
        let err = create_provider(&model, &config, None).err().unwrap();
        assert!(matches!(err, RelayError::Configuration(msg) if msg.contains("ANTHROPIC_API_KEY")));
    }

    #[cfg(feature = "google")]
    #[test]
    fn config_key_is_used_when_no_explicit_key() {
        let config = RelayConfig::new();
        config.set_api_key(ProviderKey::Google, "g-key".into());
        let model: LanguageModel = "gemini/gemini-2.5-pro".parse().unwrap();
        let provider = create_provider(&model, &config, None).unwrap();
        assert_eq!(provider.provider_name(), "google");
    }
}
