//! The core [`Provider`] trait for completion calls.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ChatRequest, ChatResponse};

/// A provider that can execute completion requests.
///
/// Implementations handle the protocol details for a specific API
/// (authentication, request formatting, response parsing). They make exactly
/// one HTTP attempt per call; retries belong to
/// [`RetryPolicy`](crate::retry::RetryPolicy).
#[async_trait]
pub trait Provider: Send + Sync {
    /// Returns the provider name (e.g. "openai", "yandexgpt").
    fn name(&self) -> &str;

    /// Execute a completion request and return the response.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`](crate::error::ProviderError) if the request
    /// fails due to network issues, authentication problems, rate limiting,
    /// or invalid responses.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse>;
}
