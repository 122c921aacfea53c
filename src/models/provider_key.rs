//! Typed provider identifiers and alias handling.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// Canonical provider keys used across model parsing, config, and provider wiring.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProviderKey {
    OpenAi,
    Anthropic,
    Google,
}

impl ProviderKey {
    /// Canonical provider key string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
        }
    }

    /// Parse user-facing provider aliases into a typed provider key.
    ///
    /// Matching is case-insensitive; unknown names return `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "anthropic" => Some(Self::Anthropic),
            "google" | "gemini" | "google-gemini" => Some(Self::Google),
            _ => None,
        }
    }

    /// Environment variable consulted for this provider's API key.
    pub const fn api_key_env(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Google => "GOOGLE_API_KEY",
        }
    }
}
