//! YandexGPT foundation models provider.
//!
//! The completion API differs from the OpenAI shape: the model is addressed
//! by a `gpt://{folder}/{model}` URI, messages carry `text` instead of
//! `content`, and the answer lives under `result.alternatives`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProviderError, Result};
use crate::http::{build_client, error_for_status};
use crate::provider::Provider;
use crate::types::{ChatRequest, ChatResponse, Usage};

/// Public completion endpoint.
pub const YANDEX_COMPLETION_URL: &str = "https://llm.api.cloud.yandex.net/foundationModels/v1/completion";

/// Default token limit when the request does not set one.
const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Connection settings for YandexGPT.
#[derive(Clone)]
pub struct YandexConfig {
    /// Full completion endpoint URL.
    pub completion_url: String,
    /// Service account API key.
    pub api_key: String,
    /// Yandex Cloud folder id.
    pub folder_id: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl YandexConfig {
    /// Settings for the public endpoint with a 10 second timeout.
    pub fn new(api_key: impl Into<String>, folder_id: impl Into<String>) -> Self {
        Self {
            completion_url: YANDEX_COMPLETION_URL.into(),
            api_key: api_key.into(),
            folder_id: folder_id.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl std::fmt::Debug for YandexConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YandexConfig")
            .field("completion_url", &self.completion_url)
            .field("api_key", &"***")
            .field("folder_id", &self.folder_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionBody<'a> {
    model_uri: String,
    completion_options: CompletionOptions,
    messages: Vec<YandexMessage<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionOptions {
    stream: bool,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct YandexMessage<'a> {
    role: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionReply {
    result: CompletionResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
    #[serde(default)]
    usage: Option<YandexUsage>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    message: AlternativeMessage,
}

#[derive(Debug, Deserialize)]
struct AlternativeMessage {
    #[serde(default)]
    text: String,
}

/// Yandex reports token counts as strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YandexUsage {
    #[serde(default)]
    input_text_tokens: String,
    #[serde(default)]
    completion_tokens: String,
    #[serde(default)]
    total_tokens: String,
}

impl From<YandexUsage> for Usage {
    fn from(u: YandexUsage) -> Self {
        Self {
            prompt_tokens: u.input_text_tokens.parse().unwrap_or(0),
            completion_tokens: u.completion_tokens.parse().unwrap_or(0),
            total_tokens: u.total_tokens.parse().unwrap_or(0),
        }
    }
}

/// Provider for the YandexGPT completion API.
pub struct YandexGptProvider {
    config: YandexConfig,
    http: reqwest::Client,
}

impl YandexGptProvider {
    /// Create a provider from connection settings.
    pub fn new(config: YandexConfig) -> Self {
        let http = build_client(config.timeout);
        Self { config, http }
    }

    /// `gpt://{folder}/{model}`.
    pub fn model_uri(&self, model: &str) -> String {
        format!("gpt://{}/{}", self.config.folder_id, model)
    }

    fn body<'a>(&self, request: &'a ChatRequest) -> CompletionBody<'a> {
        CompletionBody {
            model_uri: self.model_uri(&request.model),
            completion_options: CompletionOptions {
                stream: false,
                temperature: request.temperature.unwrap_or(0.3),
                max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            },
            messages: request
                .messages
                .iter()
                .map(|m| YandexMessage {
                    role: &m.role,
                    text: &m.content,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl Provider for YandexGptProvider {
    fn name(&self) -> &str {
        "yandexgpt"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        if self.config.api_key.is_empty() || self.config.folder_id.is_empty() {
            return Err(ProviderError::NotConfigured("YandexGPT api key and folder id are required".into()));
        }

        debug!(
            provider = "yandexgpt",
            model = %request.model,
            messages = request.messages.len(),
            "sending completion request"
        );

        let response = self
            .http
            .post(&self.config.completion_url)
            .header("Authorization", format!("Api-Key {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&self.body(request))
            .send()
            .await
            .map_err(ProviderError::from_send)?;
        let response = error_for_status("yandexgpt", response).await?;

        let reply: CompletionReply = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("failed to parse response: {e}")))?;

        let CompletionResult {
            alternatives,
            usage,
            model_version,
        } = reply.result;
        let text = alternatives
            .into_iter()
            .next()
            .map(|a| a.message.text)
            .ok_or_else(|| ProviderError::InvalidResponse("response has no alternatives".into()))?;

        debug!(provider = "yandexgpt", chars = text.len(), "completion received");

        let mut chat = ChatResponse::from_text(model_version.unwrap_or_else(|| request.model.clone()), text);
        chat.usage = usage.map(Usage::from);
        Ok(chat)
    }
}

impl std::fmt::Debug for YandexGptProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YandexGptProvider").field("config", &self.config).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    #[test]
    fn model_uri_uses_folder() {
        let provider = YandexGptProvider::new(YandexConfig::new("key", "b1gfolder"));
        assert_eq!(provider.model_uri("yandexgpt-lite"), "gpt://b1gfolder/yandexgpt-lite");
    }

    #[test]
    fn body_wire_format() {
        let provider = YandexGptProvider::new(YandexConfig::new("key", "f"));
        let request = ChatRequest::new("yandexgpt-lite", vec![ChatMessage::user("hello")]);
        let json = serde_json::to_value(provider.body(&request)).unwrap();
        assert_eq!(json["modelUri"], "gpt://f/yandexgpt-lite");
        assert_eq!(json["completionOptions"]["stream"], false);
        assert_eq!(json["completionOptions"]["temperature"], 0.3);
        assert_eq!(json["completionOptions"]["maxTokens"], 2000);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["text"], "hello");
    }

    #[test]
    fn usage_parses_string_counts() {
        let u: YandexUsage =
            serde_json::from_str(r#"{"inputTextTokens": "12", "completionTokens": "5", "totalTokens": "17"}"#)
                .unwrap();
        let usage = Usage::from(u);
        assert_eq!(usage.total_tokens, 17);
    }

    #[test]
    fn debug_hides_api_key() {
        let provider = YandexGptProvider::new(YandexConfig::new("AQVN-secret", "f"));
        let s = format!("{provider:?}");
        assert!(!s.contains("AQVN-secret"));
    }

    #[tokio::test]
    async fn empty_credentials_are_not_configured() {
        let provider = YandexGptProvider::new(YandexConfig::new("", "f"));
        let request = ChatRequest::new("yandexgpt-lite", vec![ChatMessage::user("hi")]);
        let err = provider.complete(&request).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
