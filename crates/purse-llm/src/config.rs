//! Provider connection settings and construction from the user config.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use purse_types::config::{AiConfig, AiProviderKind};
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, Result};
use crate::openai_compat::OpenAiCompatProvider;
use crate::provider::Provider;
use crate::yandex::{YandexConfig, YandexGptProvider};

/// Default OpenAI endpoint.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProviderConfig {
    /// Human-readable provider name (used in logs).
    pub name: String,

    /// Base URL (e.g. "https://api.openai.com/v1").
    pub base_url: String,

    /// Environment variable that holds the API key.
    pub api_key_env: String,

    /// Extra HTTP headers sent with every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Request timeout in seconds. Defaults to 10.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl LlmProviderConfig {
    /// Effective request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(10))
    }
}

/// Build the provider described by the `ai` config section.
///
/// # Errors
///
/// [`ProviderError::NotConfigured`] when the API key (or, for YandexGPT,
/// the folder id) cannot be resolved.
pub fn provider_from_config(ai: &AiConfig) -> Result<Arc<dyn Provider>> {
    let api_key = ai.resolve_api_key().ok_or_else(|| {
        ProviderError::NotConfigured(format!("set {} env var", ai.effective_api_key_env()))
    })?;

    match ai.provider {
        AiProviderKind::OpenAi => {
            let config = LlmProviderConfig {
                name: "openai".into(),
                base_url: ai.base_url.clone().unwrap_or_else(|| OPENAI_BASE_URL.into()),
                api_key_env: ai.effective_api_key_env().to_string(),
                headers: HashMap::new(),
                timeout_secs: Some(ai.timeout_secs),
            };
            Ok(Arc::new(OpenAiCompatProvider::with_api_key(config, api_key)))
        }
        AiProviderKind::Yandex => {
            let folder_id = ai.resolve_folder_id().ok_or_else(|| {
                ProviderError::NotConfigured(format!("set {} env var", ai.folder_id_env))
            })?;
            let mut config = YandexConfig::new(api_key, folder_id);
            if let Some(url) = &ai.base_url {
                config.completion_url = url.clone();
            }
            config.timeout = Duration::from_secs(ai.timeout_secs);
            Ok(Arc::new(YandexGptProvider::new(config)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_with_explicit_key() {
        let ai = AiConfig {
            provider: AiProviderKind::OpenAi,
            api_key: Some("sk-test".into()),
            ..AiConfig::default()
        };
        let provider = provider_from_config(&ai).unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn yandex_missing_folder_is_not_configured() {
        let ai = AiConfig {
            api_key: Some("key".into()),
            folder_id_env: "PURSE_TEST_NO_SUCH_FOLDER_VAR".into(),
            ..AiConfig::default()
        };
        let err = provider_from_config(&ai).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
        assert!(err.to_string().contains("PURSE_TEST_NO_SUCH_FOLDER_VAR"));
    }

    #[test]
    fn missing_key_is_not_configured() {
        let ai = AiConfig {
            provider: AiProviderKind::OpenAi,
            api_key_env: Some("PURSE_TEST_NO_SUCH_KEY_VAR".into()),
            ..AiConfig::default()
        };
        let err = provider_from_config(&ai).err().unwrap();
        assert!(err.to_string().contains("PURSE_TEST_NO_SUCH_KEY_VAR"));
    }

    #[test]
    fn yandex_from_env() {
        temp_env::with_vars(
            [("PURSE_TEST_YA_KEY", Some("ya-key")), ("PURSE_TEST_YA_FOLDER", Some("b1gfolder"))],
            || {
                let ai = AiConfig {
                    api_key_env: Some("PURSE_TEST_YA_KEY".into()),
                    folder_id_env: "PURSE_TEST_YA_FOLDER".into(),
                    ..AiConfig::default()
                };
                let provider = provider_from_config(&ai).unwrap();
                assert_eq!(provider.name(), "yandexgpt");
            },
        );
    }

    #[test]
    fn default_timeout() {
        let cfg = LlmProviderConfig {
            name: "x".into(),
            base_url: "http://localhost".into(),
            api_key_env: "X".into(),
            headers: HashMap::new(),
            timeout_secs: None,
        };
        assert_eq!(cfg.timeout(), Duration::from_secs(10));
    }
}
