//! CLI command implementations for `purse`.
//!
//! - [`parse`] -- one-shot extraction and categorization.
//! - [`chat`] -- interactive confirmation session.
//! - [`status`] -- health snapshot.
//! - [`watch`] -- periodic health monitor.
//! - [`config_cmd`] -- resolved configuration.
//! - [`history`] -- stored transactions.

pub mod chat;
pub mod config_cmd;
pub mod history;
pub mod parse;
pub mod status;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use comfy_table::{Table, presets::UTF8_FULL};
use purse_core::{Resilience, TransactionPipeline};
use purse_services::{HealthMonitor, JsonlStore};
use purse_types::config::Config;
use purse_types::config::loader::{self, CONFIG_ENV_VAR, discover_config_path};
use purse_types::transaction::{TransactionCandidate, format_amount};

/// Load configuration from the given path override or via auto-discovery.
///
/// An explicit override must exist. Without one, the discovery chain is
/// `PURSE_CONFIG` then `~/.purse/config.json`, falling back to defaults.
pub fn load_config(config_override: Option<&str>) -> anyhow::Result<Config> {
    let config = match config_override {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!("config file not found: {path_str}");
            }
            loader::load_config_from(path)?
        }
        None => loader::load_config()?,
    };
    Ok(config)
}

/// Discover the config file path (for display in `purse config path`).
pub fn discover_path() -> Option<PathBuf> {
    discover_config_path(std::env::var(CONFIG_ENV_VAR).ok(), dirs::home_dir())
}

/// Everything one CLI process wires together.
pub struct Runtime {
    /// The message pipeline.
    pub pipeline: Arc<TransactionPipeline>,
    /// Health monitor over the same resilience state and metrics.
    pub monitor: Arc<HealthMonitor>,
    /// Where confirmed batches go.
    pub store: JsonlStore,
}

impl Runtime {
    /// Build the pipeline, monitor and store from config.
    ///
    /// `offline` skips the AI categorizer even when credentials exist.
    pub fn build(config: &Config, offline: bool) -> anyhow::Result<Self> {
        let resilience = Resilience::from_config(&config.resilience);
        let pipeline = if offline {
            TransactionPipeline::new(Arc::new(config.catalog()?), config.access.clone())
        } else {
            TransactionPipeline::from_config(config, &resilience)?
        };

        let mut monitor = HealthMonitor::new(config.health.clone(), resilience, pipeline.metrics());
        if let Some(categorizer) = pipeline.categorizer() {
            monitor = monitor.with_categorizer(categorizer.clone());
        }

        let store = JsonlStore::new(config.store.store_path());
        Ok(Self {
            pipeline: Arc::new(pipeline),
            monitor: Arc::new(monitor),
            store,
        })
    }
}

/// Render candidates as a numbered table.
pub fn candidates_table(candidates: &[TransactionCandidate]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["#", "Description", "Category", "Source", "Amount"]);
    for (i, c) in candidates.iter().enumerate() {
        table.add_row(vec![
            (i + 1).to_string(),
            c.description.clone(),
            c.category.clone().unwrap_or_else(|| "?".into()),
            c.category_source.to_string(),
            format!("{}{}", c.kind.sign(), format_amount(c.amount)),
        ]);
    }
    table
}

/// Mask an API key, showing only the first 4 and last 4 characters.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let prefix: String = chars[..4].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    let middle_len = chars.len() - 8;
    format!("{prefix}{}...{suffix}", "*".repeat(middle_len.min(8)))
}
