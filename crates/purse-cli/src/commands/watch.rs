//! `purse watch` -- run the health monitor in the foreground.

use std::time::Duration;

use clap::Args;
use purse_services::format_status;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{Runtime, load_config};

/// Arguments for the `purse watch` subcommand.
#[derive(Args)]
pub struct WatchArgs {
    /// Seconds between reports (defaults to `health.interval_secs`).
    #[arg(long)]
    pub interval: Option<u64>,

    /// Config file path (overrides auto-discovery).
    #[arg(short, long)]
    pub config: Option<String>,
}

/// Run the watch command until Ctrl+C.
pub async fn run(args: WatchArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(secs) = args.interval {
        config.health.interval_secs = secs.max(1);
    }
    let interval = Duration::from_secs(config.health.interval_secs);
    let runtime = Runtime::build(&config, false)?;

    println!("{}", format_status(&runtime.monitor.snapshot()));
    println!();

    let cancel = CancellationToken::new();
    let monitor = runtime.monitor.clone();
    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            monitor
                .run_with(cancel, |snapshot| {
                    println!("{}", format_status(snapshot));
                    println!();
                })
                .await;
        })
    };

    info!(interval_secs = interval.as_secs(), "watching health -- press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("received shutdown signal");
    cancel.cancel();
    handle.await?;
    Ok(())
}
