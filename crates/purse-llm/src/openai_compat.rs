//! OpenAI-compatible provider implementation.
//!
//! [`OpenAiCompatProvider`] works with any API that follows the OpenAI chat
//! completion format (OpenAI itself, local gateways, most hosted models).

use async_trait::async_trait;
use tracing::debug;

use crate::config::LlmProviderConfig;
use crate::error::{ProviderError, Result};
use crate::http::{build_client, error_for_status};
use crate::provider::Provider;
use crate::types::{ChatRequest, ChatResponse};

/// A provider that uses the OpenAI-compatible chat completion API.
pub struct OpenAiCompatProvider {
    config: LlmProviderConfig,
    http: reqwest::Client,
    api_key: Option<String>,
}

impl OpenAiCompatProvider {
    /// Create a new provider from configuration.
    ///
    /// The API key will be resolved from the environment variable specified
    /// in `config.api_key_env` at request time.
    pub fn new(config: LlmProviderConfig) -> Self {
        let http = build_client(config.timeout());
        Self {
            config,
            http,
            api_key: None,
        }
    }

    /// Create a new provider with an explicit API key.
    pub fn with_api_key(config: LlmProviderConfig, api_key: String) -> Self {
        let http = build_client(config.timeout());
        Self {
            config,
            http,
            api_key: Some(api_key),
        }
    }

    /// Returns the provider configuration.
    pub fn config(&self) -> &LlmProviderConfig {
        &self.config
    }

    fn completions_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    /// Resolve the API key: explicit key > environment variable.
    fn resolve_api_key(&self) -> Result<String> {
        if let Some(ref key) = self.api_key {
            return Ok(key.clone());
        }
        std::env::var(&self.config.api_key_env)
            .map_err(|_| ProviderError::NotConfigured(format!("set {} env var", self.config.api_key_env)))
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let api_key = self.resolve_api_key()?;
        let url = self.completions_url();

        debug!(
            provider = %self.config.name,
            model = %request.model,
            messages = request.messages.len(),
            "sending chat completion request"
        );

        let mut req = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json");

        for (k, v) in &self.config.headers {
            req = req.header(k.as_str(), v.as_str());
        }

        let response = req.json(request).send().await.map_err(ProviderError::from_send)?;
        let response = error_for_status(&self.config.name, response).await?;

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("failed to parse response: {e}")))?;

        if chat_response.choices.is_empty() {
            return Err(ProviderError::InvalidResponse("response has no choices".into()));
        }

        debug!(
            provider = %self.config.name,
            model = %chat_response.model,
            "chat completion response received"
        );

        Ok(chat_response)
    }
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("name", &self.config.name)
            .field("base_url", &self.config.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_config() -> LlmProviderConfig {
        LlmProviderConfig {
            name: "test-provider".into(),
            base_url: "https://api.example.com/v1".into(),
            api_key_env: "PURSE_TEST_PROVIDER_API_KEY".into(),
            headers: HashMap::new(),
            timeout_secs: None,
        }
    }

    #[test]
    fn completions_url_strips_trailing_slash() {
        let mut config = test_config();
        config.base_url = "https://api.example.com/v1/".into();
        let provider = OpenAiCompatProvider::new(config);
        assert_eq!(provider.completions_url(), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn resolve_api_key_explicit() {
        let provider = OpenAiCompatProvider::with_api_key(test_config(), "sk-explicit".into());
        assert_eq!(provider.resolve_api_key().unwrap(), "sk-explicit");
    }

    #[test]
    fn resolve_api_key_from_env() {
        temp_env::with_var("PURSE_TEST_PROVIDER_API_KEY", Some("sk-from-env"), || {
            let provider = OpenAiCompatProvider::new(test_config());
            assert_eq!(provider.resolve_api_key().unwrap(), "sk-from-env");
        });
    }

    #[test]
    fn resolve_api_key_missing() {
        let mut config = test_config();
        config.api_key_env = "PURSE_NONEXISTENT_KEY_98765".into();
        let provider = OpenAiCompatProvider::new(config);
        let err = provider.resolve_api_key().unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
        assert!(err.to_string().contains("PURSE_NONEXISTENT_KEY_98765"));
    }

    #[test]
    fn debug_hides_api_key() {
        let provider = OpenAiCompatProvider::with_api_key(test_config(), "sk-secret-key".into());
        let debug_str = format!("{provider:?}");
        assert!(!debug_str.contains("sk-secret-key"));
        assert!(debug_str.contains("***"));
    }
}
