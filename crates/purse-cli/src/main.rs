//! `purse` -- CLI for the purse transaction assistant.
//!
//! Provides the following subcommands:
//!
//! - `purse parse` -- Extract and categorize transactions from one message.
//! - `purse chat` -- Interactive session with confirmation and edits.
//! - `purse status` -- One-shot health snapshot.
//! - `purse watch` -- Periodic health monitor.
//! - `purse config` -- Show resolved configuration.
//! - `purse history` -- List stored transactions.

use clap::{Parser, Subcommand};

mod commands;

/// purse transaction assistant CLI.
#[derive(Parser)]
#[command(name = "purse", about = "purse transaction assistant CLI", version)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Extract and categorize transactions from a message.
    Parse(commands::parse::ParseArgs),

    /// Start an interactive session.
    Chat(commands::chat::ChatArgs),

    /// Show a health snapshot.
    Status(commands::status::StatusArgs),

    /// Log health snapshots at a fixed interval until Ctrl+C.
    Watch(commands::watch::WatchArgs),

    /// Show resolved configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },

    /// List stored transactions.
    History(commands::history::HistoryArgs),
}

/// Subcommands for `purse config`.
#[derive(Subcommand)]
enum ConfigCmd {
    /// Show the full resolved configuration as JSON.
    Show {
        /// Config file path (overrides auto-discovery).
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Show one configuration section.
    Section {
        /// Section name (ai, resilience, health, access, categories, store).
        name: String,

        /// Config file path (overrides auto-discovery).
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Print the discovered config file path.
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Parse(args) => commands::parse::run(args).await?,
        Commands::Chat(args) => commands::chat::run(args).await?,
        Commands::Status(args) => commands::status::run(args).await?,
        Commands::Watch(args) => commands::watch::run(args).await?,
        Commands::Config { action } => match action {
            ConfigCmd::Show { config } => {
                let cfg = commands::load_config(config.as_deref())?;
                commands::config_cmd::config_show(&cfg);
            }
            ConfigCmd::Section { name, config } => {
                let cfg = commands::load_config(config.as_deref())?;
                commands::config_cmd::config_section(&cfg, &name)?;
            }
            ConfigCmd::Path => commands::config_cmd::config_path(),
        },
        Commands::History(args) => commands::history::run(args).await?,
    }

    Ok(())
}
