//! `purse config` -- display resolved configuration.
//!
//! API keys are masked before printing.
//!
//! # Examples
//!
//! ```text
//! purse config show
//! purse config section resilience
//! purse config path
//! ```

use purse_types::config::Config;
use purse_types::config::loader::CONFIG_ENV_VAR;
use serde_json::Value;

use super::{discover_path, mask_key};

fn masked_value(config: &Config) -> Value {
    let mut value = serde_json::to_value(config).unwrap_or_default();
    if let Some(key) = value.pointer_mut("/ai/api_key")
        && let Some(raw) = key.as_str()
    {
        *key = Value::String(mask_key(raw));
    }
    value
}

/// Display the resolved configuration as formatted JSON.
pub fn config_show(config: &Config) {
    match serde_json::to_string_pretty(&masked_value(config)) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("error: failed to serialize config: {e}"),
    }
}

/// Display one configuration section.
pub fn config_section(config: &Config, section: &str) -> anyhow::Result<()> {
    let value = masked_value(config);
    match value.get(section) {
        Some(v) => {
            println!("{}", serde_json::to_string_pretty(v)?);
            Ok(())
        }
        None => {
            let available: Vec<&str> = value
                .as_object()
                .map(|m| m.keys().map(|k| k.as_str()).collect())
                .unwrap_or_default();
            anyhow::bail!("unknown section '{section}' (available: {})", available.join(", "))
        }
    }
}

/// Print where the config would be loaded from.
pub fn config_path() {
    match discover_path() {
        Some(path) => println!("{}", path.display()),
        None => {
            println!("not found");
            println!("  Searched: ~/.purse/config.json");
            println!("  Set {CONFIG_ENV_VAR} env var to override");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_is_masked() {
        let mut config = Config::default();
        config.ai.api_key = Some("sk-live-1234567890".into());
        let value = masked_value(&config);
        let shown = value.pointer("/ai/api_key").and_then(Value::as_str).unwrap();
        assert!(shown.starts_with("sk-l"));
        assert!(!shown.contains("1234567"));
    }

    #[test]
    fn known_section_succeeds() {
        assert!(config_section(&Config::default(), "resilience").is_ok());
    }

    #[test]
    fn unknown_section_lists_available() {
        let err = config_section(&Config::default(), "nonexistent").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unknown section 'nonexistent'"));
        assert!(msg.contains("resilience"));
    }
}
