//! `purse status` -- one-shot health snapshot.
//!
//! A fresh process has no traffic, so this mostly shows configuration:
//! which dependencies are registered and what their rate budgets are.

use clap::Args;
use purse_services::format_status;

use super::{Runtime, load_config};

/// Arguments for the `purse status` subcommand.
#[derive(Args)]
pub struct StatusArgs {
    /// Print the snapshot as JSON.
    #[arg(long)]
    pub json: bool,

    /// Config file path (overrides auto-discovery).
    #[arg(short, long)]
    pub config: Option<String>,
}

/// Run the status command.
pub async fn run(args: StatusArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let runtime = Runtime::build(&config, false)?;
    let snapshot = runtime.monitor.snapshot();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("{}", format_status(&snapshot));
    }
    Ok(())
}
