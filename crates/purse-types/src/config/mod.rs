//! Configuration schema types.
//!
//! All structs accept both `snake_case` and `camelCase` field names (the
//! loader normalizes keys before deserializing). Unknown fields are ignored.
//! Configuration is read once at startup and never changes afterwards.
//!
//! # Module Structure
//!
//! - [`resilience`] -- rate limit, circuit breaker and retry settings
//! - [`loader`] -- config file discovery and key normalization

pub mod loader;
pub mod resilience;

pub use resilience::*;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::category::{Category, CategoryCatalog};
use crate::error::{PurseError, Result};

// ── Root config ──────────────────────────────────────────────────────────

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// AI categorization service.
    #[serde(default)]
    pub ai: AiConfig,

    /// Protective shell around external calls.
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Health monitor settings.
    #[serde(default)]
    pub health: HealthConfig,

    /// Who may talk to the assistant and how often.
    #[serde(default)]
    pub access: AccessConfig,

    /// Category catalog override. `None` uses the built-in catalog.
    #[serde(default)]
    pub categories: Option<Vec<Category>>,

    /// Transaction store settings.
    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    /// Build the category catalog this config describes.
    pub fn catalog(&self) -> Result<CategoryCatalog> {
        match &self.categories {
            Some(cats) => CategoryCatalog::new(cats.clone()),
            None => Ok(CategoryCatalog::builtin()),
        }
    }

    /// Reject values that would make the pipeline misbehave.
    pub fn validate(&self) -> Result<()> {
        self.resilience.validate()?;
        if self.ai.timeout_secs == 0 {
            return Err(PurseError::ConfigInvalid {
                reason: "ai.timeout_secs must be > 0".into(),
            });
        }
        if self.health.interval_secs == 0 {
            return Err(PurseError::ConfigInvalid {
                reason: "health.interval_secs must be > 0".into(),
            });
        }
        self.catalog().map(|_| ())
    }
}

// ── AI ───────────────────────────────────────────────────────────────────

/// Which AI categorization backend to talk to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AiProviderKind {
    /// YandexGPT foundation models API.
    #[default]
    Yandex,
    /// Any OpenAI-compatible `/chat/completions` endpoint.
    #[serde(alias = "openai_compat", alias = "open_ai")]
    OpenAi,
}

/// AI categorization service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Backend flavour.
    #[serde(default)]
    pub provider: AiProviderKind,

    /// Endpoint override. Defaults depend on `provider`.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Model name (`yandexgpt-lite`, `gpt-4o-mini`, ...).
    #[serde(default = "default_ai_model")]
    pub model: String,

    /// Explicit API key. Prefer `api_key_env`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Yandex Cloud folder id (Yandex only).
    #[serde(default)]
    pub folder_id: Option<String>,

    /// Environment variable holding the folder id.
    #[serde(default = "default_folder_id_env")]
    pub folder_id_env: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_ai_timeout_secs")]
    pub timeout_secs: u64,

    /// Sampling temperature.
    #[serde(default = "default_ai_temperature")]
    pub temperature: f64,
}

fn default_ai_model() -> String {
    "yandexgpt-lite".into()
}
fn default_folder_id_env() -> String {
    "YANDEX_GPT_FOLDER_ID".into()
}
fn default_ai_timeout_secs() -> u64 {
    10
}
fn default_ai_temperature() -> f64 {
    0.3
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: AiProviderKind::default(),
            base_url: None,
            model: default_ai_model(),
            api_key: None,
            api_key_env: None,
            folder_id: None,
            folder_id_env: default_folder_id_env(),
            timeout_secs: default_ai_timeout_secs(),
            temperature: default_ai_temperature(),
        }
    }
}

impl AiConfig {
    /// Environment variable consulted for the API key.
    pub fn effective_api_key_env(&self) -> &str {
        match (&self.api_key_env, self.provider) {
            (Some(env), _) => env,
            (None, AiProviderKind::Yandex) => "YANDEX_GPT_API_KEY",
            (None, AiProviderKind::OpenAi) => "OPENAI_API_KEY",
        }
    }

    /// Explicit key, else the environment variable, else `None`.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(self.effective_api_key_env()).ok())
            .filter(|k| !k.is_empty())
    }

    /// Explicit folder id, else the environment variable.
    pub fn resolve_folder_id(&self) -> Option<String> {
        self.folder_id
            .clone()
            .filter(|f| !f.is_empty())
            .or_else(|| std::env::var(&self.folder_id_env).ok())
            .filter(|f| !f.is_empty())
    }

    /// Whether enough credentials exist to call the service at all.
    pub fn is_configured(&self) -> bool {
        let has_key = self.resolve_api_key().is_some();
        match self.provider {
            AiProviderKind::Yandex => has_key && self.resolve_folder_id().is_some(),
            AiProviderKind::OpenAi => has_key,
        }
    }
}

// ── Health ───────────────────────────────────────────────────────────────

/// Health monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Seconds between passive health log lines.
    #[serde(default = "default_health_interval_secs")]
    pub interval_secs: u64,

    /// Warn when a circuit has been open longer than this many seconds.
    #[serde(default = "default_open_alert_secs")]
    pub open_alert_secs: u64,

    /// Warn when resident memory exceeds this many MiB.
    #[serde(default = "default_memory_warn_mb")]
    pub memory_warn_mb: u64,
}

fn default_health_interval_secs() -> u64 {
    300
}
fn default_open_alert_secs() -> u64 {
    600
}
fn default_memory_warn_mb() -> u64 {
    400
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_health_interval_secs(),
            open_alert_secs: default_open_alert_secs(),
            memory_warn_mb: default_memory_warn_mb(),
        }
    }
}

// ── Access ───────────────────────────────────────────────────────────────

/// Access control and per-user throttling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Users allowed to submit messages. Empty allows everyone.
    #[serde(default)]
    pub allowed_user_ids: Vec<i64>,

    /// Messages per user per minute. 0 disables the per-user throttle.
    #[serde(default = "default_messages_per_minute")]
    pub messages_per_minute: u32,
}

fn default_messages_per_minute() -> u32 {
    20
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            allowed_user_ids: Vec::new(),
            messages_per_minute: default_messages_per_minute(),
        }
    }
}

impl AccessConfig {
    /// Allowlist check; an empty list allows everyone.
    pub fn is_user_allowed(&self, user_id: i64) -> bool {
        self.allowed_user_ids.is_empty() || self.allowed_user_ids.contains(&user_id)
    }
}

// ── Store ────────────────────────────────────────────────────────────────

/// Where confirmed transactions are appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSONL file path; `~/` is expanded.
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "~/.purse/transactions.jsonl".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl StoreConfig {
    /// Get the expanded store path.
    pub fn store_path(&self) -> PathBuf {
        if let Some(rest) = self.path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(rest);
        }
        PathBuf::from(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.ai.provider, AiProviderKind::Yandex);
        assert_eq!(cfg.ai.model, "yandexgpt-lite");
        assert_eq!(cfg.ai.timeout_secs, 10);
        assert_eq!(cfg.resilience.circuit.failure_threshold, 5);
        assert_eq!(cfg.access.messages_per_minute, 20);
        assert!(cfg.categories.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn provider_kind_parses() {
        let cfg: AiConfig = serde_json::from_str(r#"{"provider": "openai", "model": "gpt-4o-mini"}"#).unwrap();
        assert_eq!(cfg.provider, AiProviderKind::OpenAi);
        assert_eq!(cfg.effective_api_key_env(), "OPENAI_API_KEY");
    }

    #[test]
    fn explicit_api_key_wins() {
        let cfg = AiConfig {
            provider: AiProviderKind::OpenAi,
            api_key: Some("sk-test".into()),
            ..AiConfig::default()
        };
        assert_eq!(cfg.resolve_api_key().as_deref(), Some("sk-test"));
        assert!(cfg.is_configured());
    }

    #[test]
    fn yandex_needs_folder_id() {
        let cfg = AiConfig {
            api_key: Some("key".into()),
            folder_id: None,
            folder_id_env: "PURSE_TEST_FOLDER_ID_THAT_IS_NOT_SET".into(),
            ..AiConfig::default()
        };
        assert!(!cfg.is_configured());

        let cfg = AiConfig {
            folder_id: Some("b1g".into()),
            ..cfg
        };
        assert!(cfg.is_configured());
    }

    #[test]
    fn allowlist_empty_allows_everyone() {
        let access = AccessConfig::default();
        assert!(access.is_user_allowed(42));

        let access = AccessConfig {
            allowed_user_ids: vec![1, 2],
            ..Default::default()
        };
        assert!(access.is_user_allowed(2));
        assert!(!access.is_user_allowed(3));
    }

    #[test]
    fn custom_catalog_from_config() {
        let cfg: Config = serde_json::from_str(
            r#"{"categories": [{"code": "taxi", "name": "Taxi", "keywords": ["taxi"]}]}"#,
        )
        .unwrap();
        let catalog = cfg.catalog().unwrap();
        assert_eq!(catalog.names(), vec!["Taxi"]);
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut cfg = Config::default();
        cfg.ai.timeout_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn store_path_expands_home() {
        let store = StoreConfig {
            path: "/tmp/purse.jsonl".into(),
        };
        assert_eq!(store.store_path(), PathBuf::from("/tmp/purse.jsonl"));
        if dirs::home_dir().is_some() {
            assert!(!StoreConfig::default().store_path().starts_with("~"));
        }
    }
}
