//! `purse history` -- list stored transactions.

use clap::Args;
use comfy_table::{Table, presets::UTF8_FULL};
use purse_services::JsonlStore;
use purse_types::transaction::{ConfirmedTransaction, format_amount};

use super::load_config;

/// Arguments for the `purse history` subcommand.
#[derive(Args)]
pub struct HistoryArgs {
    /// Show at most this many of the most recent rows.
    #[arg(long, default_value = "20")]
    pub limit: usize,

    /// Print rows as JSON lines.
    #[arg(long)]
    pub json: bool,

    /// Config file path (overrides auto-discovery).
    #[arg(short, long)]
    pub config: Option<String>,
}

/// Run the history command.
pub async fn run(args: HistoryArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let store = JsonlStore::new(config.store.store_path());
    let rows = store.load().await?;
    let recent = &rows[rows.len().saturating_sub(args.limit)..];

    if recent.is_empty() {
        println!("No transactions stored in {}.", store.path().display());
        return Ok(());
    }

    if args.json {
        for row in recent {
            println!("{}", serde_json::to_string(row)?);
        }
    } else {
        println!("{}", history_table(recent));
    }
    Ok(())
}

fn history_table(rows: &[ConfirmedTransaction]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Date", "Category", "Description", "Amount", "Source"]);
    for row in rows {
        table.add_row(vec![
            row.recorded_at.format("%Y-%m-%d %H:%M").to_string(),
            row.category.clone(),
            row.description.clone(),
            format!("{}{}", row.kind.sign(), format_amount(row.amount)),
            row.category_source.to_string(),
        ]);
    }
    table
}
