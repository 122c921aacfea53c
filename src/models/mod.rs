//! Model identifiers and specifiers.

pub mod provider_key;

pub use provider_key::ProviderKey;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::error::RelayError;
use crate::provider::ModelProvider;

/// A model addressed by provider and provider-specific model id,
/// e.g. `openai/gpt-4o` or `anthropic:claude-sonnet-4.5`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguageModel {
    pub provider: ProviderKey,
    pub model_id: String,
}

impl LanguageModel {
    pub fn new(provider: ProviderKey, model_id: impl Into<String>) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
        }
    }
}

impl fmt::Display for LanguageModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model_id)
    }
}

fn supported_providers() -> String {
    ProviderKey::iter()
        .map(ProviderKey::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl FromStr for LanguageModel {
    type Err = RelayError;

    /// Parse `provider/model` or `provider:model`.
    ///
    /// Only the first `/` acts as a separator, so model ids may themselves
    /// contain `/` or `:` after it.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let normalized = spec.replacen('/', ":", 1);
        let normalized = normalized.trim();
        let invalid = || {
            RelayError::Configuration(format!(
                "Invalid model string \"{spec}\". Use \"openai/gpt-5\", \
                 \"anthropic/claude-sonnet-4.5\", or \"google/gemini-2.5-pro\"."
            ))
        };

        let (raw_provider, model_id) = normalized.split_once(':').ok_or_else(invalid)?;
        let model_id = model_id.trim();
        if raw_provider.trim().is_empty() || model_id.is_empty() {
            return Err(invalid());
        }

        let provider = ProviderKey::parse(raw_provider).ok_or_else(|| {
            RelayError::Configuration(format!(
                "Unknown provider \"{}\" in \"{spec}\". Supported: {}.",
                raw_provider.to_ascii_lowercase(),
                supported_providers()
            ))
        })?;

        Ok(Self::new(provider, model_id))
    }
}

/// Either a model to resolve through the provider factory or a ready handle.
#[derive(Clone)]
pub enum ModelSpecifier {
    Id(LanguageModel),
    Provider(Arc<dyn ModelProvider>),
}

impl ModelSpecifier {
    /// Parse a `provider/model` string into a specifier.
    pub fn parse(spec: &str) -> Result<Self, RelayError> {
        spec.parse().map(Self::Id)
    }
}

impl From<LanguageModel> for ModelSpecifier {
    fn from(model: LanguageModel) -> Self {
        Self::Id(model)
    }
}

impl From<Arc<dyn ModelProvider>> for ModelSpecifier {
    fn from(provider: Arc<dyn ModelProvider>) -> Self {
        Self::Provider(provider)
    }
}

impl fmt::Debug for ModelSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(model) => f.debug_tuple("Id").field(model).finish(),
            Self::Provider(provider) => f
                .debug_tuple("Provider")
                .field(&format_args!("{}/{}", provider.provider_name(), provider.model_id()))
                .finish(),
        }
    }
}
