//! AI provider abstraction for purse.
//!
//! This crate provides a unified interface for the completion APIs the
//! categorizer talks to, plus the retry policy that wraps every call.
//!
//! # Architecture
//!
//! - [`Provider`] trait defines the completion interface
//! - [`OpenAiCompatProvider`] implements it for any OpenAI-compatible API
//! - [`YandexGptProvider`] implements it for the YandexGPT completion API
//! - [`RetryPolicy`] retries transient failures with exponential backoff
//! - [`provider_from_config`] builds the configured provider
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use purse_llm::{ChatMessage, ChatRequest, RetryConfig, RetryPolicy};
//!
//! let provider = purse_llm::provider_from_config(&config.ai)?;
//! let policy = RetryPolicy::new("ai-categorizer", RetryConfig::default());
//! let request = ChatRequest::new("yandexgpt-lite", vec![ChatMessage::user("такси 500")]);
//! let response = policy.run(|_| provider.complete(&request)).await?;
//! ```

pub mod config;
pub mod error;
mod http;
pub mod openai_compat;
pub mod provider;
pub mod retry;
pub mod types;
pub mod yandex;

pub use config::{LlmProviderConfig, provider_from_config};
pub use error::{ProviderError, Result};
pub use openai_compat::OpenAiCompatProvider;
pub use provider::Provider;
pub use retry::{ErrorClass, RetryConfig, RetryError, RetryPolicy, classify};
pub use types::{ChatMessage, ChatRequest, ChatResponse, Choice, Usage};
pub use yandex::{YandexConfig, YandexGptProvider};
