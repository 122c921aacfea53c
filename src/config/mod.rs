//! Process-wide credential and endpoint configuration (code > env > `.env`).

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use crate::models::ProviderKey;

/// Global default config (lazy-initialized from env).
static DEFAULT_CONFIG: OnceLock<RelayConfig> = OnceLock::new();

/// Layered configuration shared by every run.
///
/// Resolution order for API keys:
/// 1. Keys set in code via [`RelayConfig::set_api_key`]
/// 2. Environment variables (and a `.env` file) read by [`RelayConfig::from_env`]
///
/// Runs only ever read from it; it is safe to share across concurrent runs.
#[derive(Clone, Default)]
pub struct RelayConfig {
    api_keys: Arc<RwLock<HashMap<ProviderKey, String>>>,
    base_urls: Arc<RwLock<HashMap<ProviderKey, String>>>,
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let providers: Vec<ProviderKey> = self
            .api_keys
            .read()
            .map(|keys| keys.keys().copied().collect())
            .unwrap_or_default();
        f.debug_struct("RelayConfig")
            .field("api_keys_for", &providers)
            .field("base_urls", &self.base_urls)
            .finish()
    }
}

const KEY_ENV_VARS: [(&str, ProviderKey); 4] = [
    ("OPENAI_API_KEY", ProviderKey::OpenAi),
    ("ANTHROPIC_API_KEY", ProviderKey::Anthropic),
    ("GOOGLE_API_KEY", ProviderKey::Google),
    ("GEMINI_API_KEY", ProviderKey::Google),
];

const URL_ENV_VARS: [(&str, ProviderKey); 3] = [
    ("OPENAI_BASE_URL", ProviderKey::OpenAi),
    ("ANTHROPIC_BASE_URL", ProviderKey::Anthropic),
    ("GOOGLE_BASE_URL", ProviderKey::Google),
];

impl RelayConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from environment variables (OPENAI_API_KEY, ANTHROPIC_API_KEY, etc.).
    ///
    /// The first variable found for a provider wins, so `GOOGLE_API_KEY`
    /// shadows `GEMINI_API_KEY`.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let config = Self::new();

        for (env_var, provider) in KEY_ENV_VARS {
            if config.get_api_key(provider).is_some() {
                continue;
            }
            if let Ok(key) = std::env::var(env_var) {
                if !key.trim().is_empty() {
                    config.set_api_key(provider, key);
                }
            }
        }

        for (env_var, provider) in URL_ENV_VARS {
            if let Ok(url) = std::env::var(env_var) {
                config.set_base_url(provider, url);
            }
        }

        config
    }

    /// Get (or create) the global default config.
    pub fn global() -> &'static RelayConfig {
        DEFAULT_CONFIG.get_or_init(Self::from_env)
    }

    pub fn set_api_key(&self, provider: ProviderKey, key: String) {
        if let Ok(mut keys) = self.api_keys.write() {
            keys.insert(provider, key);
        }
    }

    pub fn get_api_key(&self, provider: ProviderKey) -> Option<String> {
        self.api_keys.read().ok()?.get(&provider).cloned()
    }

    pub fn set_base_url(&self, provider: ProviderKey, url: String) {
        if let Ok(mut urls) = self.base_urls.write() {
            urls.insert(provider, url);
        }
    }

    pub fn get_base_url(&self, provider: ProviderKey) -> Option<String> {
        self.base_urls.read().ok()?.get(&provider).cloned()
    }

    /// Check if a provider has credentials configured.
    pub fn has_credentials(&self, provider: ProviderKey) -> bool {
        self.get_api_key(provider).is_some()
    }
}
