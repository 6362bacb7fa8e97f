//! `purse parse` -- extract and categorize one message.
//!
//! # Examples
//!
//! ```text
//! purse parse "обед 400, такси 500"
//! purse parse --json "зарплата 100к"
//! purse parse --offline кофе 250
//! ```

use clap::Args;

use super::{Runtime, candidates_table, load_config};

/// Arguments for the `purse parse` subcommand.
#[derive(Args)]
pub struct ParseArgs {
    /// Message text. Multiple words are joined with spaces.
    #[arg(required = true)]
    pub text: Vec<String>,

    /// User id the message is attributed to.
    #[arg(long, default_value = "0")]
    pub user_id: i64,

    /// Print candidates as JSON.
    #[arg(long)]
    pub json: bool,

    /// Skip the AI categorizer and use keyword matching only.
    #[arg(long)]
    pub offline: bool,

    /// Config file path (overrides auto-discovery).
    #[arg(short, long)]
    pub config: Option<String>,
}

/// Run the parse command.
pub async fn run(args: ParseArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let runtime = Runtime::build(&config, args.offline)?;
    let text = args.text.join(" ");

    let batch = runtime.pipeline.process(args.user_id, &text).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(batch.candidates())?);
    } else {
        println!("{}", candidates_table(batch.candidates()));
    }
    Ok(())
}
