//! Configuration file discovery and loading.
//!
//! The discovery order is:
//! 1. `PURSE_CONFIG` environment variable.
//! 2. `~/.purse/config.json`
//! 3. If none found, the built-in defaults.
//!
//! JSON keys are normalized from camelCase to snake_case before the typed
//! [`Config`] is deserialized, so both spellings work in the file.

use std::path::{Path, PathBuf};

use serde_json::Value;

use super::Config;
use crate::error::Result;

/// Environment variable that points at an explicit config file.
pub const CONFIG_ENV_VAR: &str = "PURSE_CONFIG";

/// Discover the config file path.
///
/// `env_override` is the value of [`CONFIG_ENV_VAR`], if set. It wins even
/// when the file does not exist, so a typo shows up as a warning instead of
/// silently picking up the home config.
pub fn discover_config_path(env_override: Option<String>, home_dir: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(env_path) = env_override.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(env_path));
    }

    let home = home_dir?;
    let purse_path = home.join(".purse").join("config.json");
    if purse_path.exists() {
        return Some(purse_path);
    }

    None
}

/// Discover, read, normalize and validate the configuration.
pub fn load_config() -> Result<Config> {
    let path = discover_config_path(std::env::var(CONFIG_ENV_VAR).ok(), dirs::home_dir());
    match path {
        Some(path) => load_config_from(&path),
        None => {
            tracing::info!("no config file found, using defaults");
            Ok(Config::default())
        }
    }
}

/// Load a config from an explicit path. A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config path does not exist, using defaults");
        return Ok(Config::default());
    }

    tracing::debug!(path = %path.display(), "loading config file");
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse config JSON text, normalizing keys and validating the result.
pub fn parse_config(contents: &str) -> Result<Config> {
    let value: Value = serde_json::from_str(contents)?;
    let config: Config = serde_json::from_value(normalize_keys(value))?;
    config.validate()?;
    Ok(config)
}

/// Convert camelCase JSON keys to snake_case recursively.
///
/// Only object keys change; string values (category keywords, names) are
/// left untouched.
pub fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut new_map = serde_json::Map::new();
            for (key, val) in map {
                new_map.insert(camel_to_snake(&key), normalize_keys(val));
            }
            Value::Object(new_map)
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

/// Convert a single camelCase string to snake_case.
///
/// A run of uppercase letters stays together, with an underscore inserted
/// before the last one only if a lowercase letter follows it.
///
/// # Examples
/// ```
/// # use purse_types::config::loader::camel_to_snake;
/// assert_eq!(camel_to_snake("requestsPerMinute"), "requests_per_minute");
/// assert_eq!(camel_to_snake("already_snake"), "already_snake");
/// assert_eq!(camel_to_snake("baseURL"), "base_url");
/// ```
pub fn camel_to_snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut result = String::with_capacity(name.len() + 4);

    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next = chars.get(i + 1).copied();

            if prev.is_lowercase() || (prev.is_uppercase() && next.is_some_and(|c| c.is_lowercase())) {
                result.push('_');
            }
        }
        result.push(ch.to_ascii_lowercase());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── camel_to_snake ────────────────────────────────────────────────

    #[test]
    fn camel_to_snake_basic() {
        assert_eq!(camel_to_snake("apiKeyEnv"), "api_key_env");
        assert_eq!(camel_to_snake("failureThreshold"), "failure_threshold");
        assert_eq!(camel_to_snake("model"), "model");
        assert_eq!(camel_to_snake(""), "");
    }

    #[test]
    fn camel_to_snake_acronyms() {
        assert_eq!(camel_to_snake("baseURL"), "base_url");
        assert_eq!(camel_to_snake("JSONStore"), "json_store");
    }

    // ── normalize_keys ────────────────────────────────────────────────

    #[test]
    fn normalize_keys_nested_and_arrays() {
        let input = json!({
            "rateLimit": {"requestsPerMinute": 30},
            "categories": [{"code": "pets", "name": "Pets", "keywords": ["dogFood"]}]
        });
        let expected = json!({
            "rate_limit": {"requests_per_minute": 30},
            "categories": [{"code": "pets", "name": "Pets", "keywords": ["dogFood"]}]
        });
        assert_eq!(normalize_keys(input), expected);
    }

    #[test]
    fn normalize_keys_primitives_unchanged() {
        assert_eq!(normalize_keys(json!(42)), json!(42));
        assert_eq!(normalize_keys(json!(null)), json!(null));
    }

    // ── discovery and loading ─────────────────────────────────────────

    #[test]
    fn env_override_takes_precedence() {
        let result = discover_config_path(Some("/custom/config.json".into()), Some(PathBuf::from("/home/u")));
        assert_eq!(result, Some(PathBuf::from("/custom/config.json")));
    }

    #[test]
    fn empty_env_override_is_ignored() {
        let result = discover_config_path(Some(String::new()), None);
        assert_eq!(result, None);
    }

    #[test]
    fn home_without_config_gives_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(discover_config_path(None, Some(dir.path().to_path_buf())), None);
    }

    #[test]
    fn home_config_is_found() {
        let dir = tempfile::tempdir().unwrap();
        let purse_dir = dir.path().join(".purse");
        std::fs::create_dir_all(&purse_dir).unwrap();
        std::fs::write(purse_dir.join("config.json"), "{}").unwrap();

        let found = discover_config_path(None, Some(dir.path().to_path_buf()));
        assert_eq!(found, Some(purse_dir.join("config.json")));
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let cfg = load_config_from(Path::new("/tmp/purse_test_nonexistent/config.json")).unwrap();
        assert_eq!(cfg.access.messages_per_minute, 20);
    }

    #[test]
    fn load_camel_case_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "ai": {"provider": "openai", "baseUrl": "http://localhost:9/v1", "timeoutSecs": 3},
                "resilience": {"circuit": {"failureThreshold": 2, "cooldownSecs": 5}},
                "access": {"allowedUserIds": [10, 20], "messagesPerMinute": 5}
            }"#,
        )
        .unwrap();

        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.ai.base_url.as_deref(), Some("http://localhost:9/v1"));
        assert_eq!(cfg.ai.timeout_secs, 3);
        assert_eq!(cfg.resilience.circuit.failure_threshold, 2);
        assert_eq!(cfg.access.allowed_user_ids, vec![10, 20]);
        assert_eq!(cfg.access.messages_per_minute, 5);
    }

    #[test]
    fn parse_config_validates() {
        let err = parse_config(r#"{"resilience": {"rateLimit": {"burst": 0}}}"#).unwrap_err();
        assert!(err.to_string().contains("burst"));
    }

    #[test]
    fn parse_config_rejects_malformed_json() {
        assert!(parse_config("{not json").is_err());
    }
}
