//! `purse chat` -- interactive session with confirmation.
//!
//! Each message is turned into a pending batch that the user confirms,
//! discards or corrects before it reaches the store.
//!
//! # Examples
//!
//! ```text
//! purse chat
//! > обед 400, такси 500
//! #1 ...
//! > c 2 Taxi
//! > y
//! saved 2 transaction(s)
//! > /exit
//! ```

use clap::Args;
use purse_core::{CandidateEdit, PendingBatch, PipelineError, parse_amount};
use purse_services::{TransactionStore, format_stats, format_status};
use tokio::io::AsyncBufReadExt;
use tracing::warn;

use super::{Runtime, load_config};

/// Arguments for the `purse chat` subcommand.
#[derive(Args)]
pub struct ChatArgs {
    /// User id the session speaks for.
    #[arg(long, default_value = "0")]
    pub user_id: i64,

    /// Skip the AI categorizer and use keyword matching only.
    #[arg(long)]
    pub offline: bool,

    /// Config file path (overrides auto-discovery).
    #[arg(short, long)]
    pub config: Option<String>,
}

/// One line of user input, interpreted.
#[derive(Debug, PartialEq)]
enum ChatInput {
    Quit,
    Help,
    Status,
    Stats,
    Confirm,
    Discard,
    Edit { index: usize, edit: CandidateEdit },
    Message(String),
    Invalid(String),
}

impl ChatInput {
    /// Interpret `line`. Confirmation and edit commands only apply while a
    /// batch is pending; otherwise every non-command line is a message.
    fn parse(line: &str, pending: bool) -> Self {
        let line = line.trim();
        match line {
            "/exit" | "/quit" => return Self::Quit,
            "/help" => return Self::Help,
            "/status" => return Self::Status,
            "/stats" => return Self::Stats,
            _ => {}
        }
        if !pending {
            return Self::Message(line.to_string());
        }

        match line.to_lowercase().as_str() {
            "y" | "yes" | "да" => return Self::Confirm,
            "n" | "no" | "нет" => return Self::Discard,
            _ => {}
        }

        let mut parts = line.splitn(3, char::is_whitespace);
        let (Some(cmd), Some(number)) = (parts.next(), parts.next()) else {
            return Self::Message(line.to_string());
        };
        if !matches!(cmd, "c" | "d" | "a") {
            return Self::Message(line.to_string());
        }
        let Some(index) = number.parse::<usize>().ok().and_then(|n| n.checked_sub(1)) else {
            return Self::Invalid(format!("'{number}' is not a transaction number"));
        };
        let rest = parts.next().unwrap_or("").trim();
        if rest.is_empty() {
            return Self::Invalid(format!("usage: {cmd} <n> <value>"));
        }

        let edit = match cmd {
            "c" => CandidateEdit::Category(rest.to_string()),
            "d" => CandidateEdit::Description(rest.to_string()),
            _ => match parse_amount(rest) {
                Some(amount) => CandidateEdit::Amount(amount),
                None => return Self::Invalid(format!("'{rest}' is not an amount")),
            },
        };
        Self::Edit { index, edit }
    }
}

/// Run an interactive session reading from stdin.
pub async fn run(args: ChatArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let runtime = Runtime::build(&config, args.offline)?;

    println!("purse chat -- type a message like \"обед 400, такси 500\" (/help for commands)");
    match runtime.pipeline.categorizer() {
        Some(c) => println!("Categorizer: {}", c.provider_name()),
        None => println!("Categorizer: keyword fallback only"),
    }
    println!();

    let stdin = tokio::io::stdin();
    let mut reader = tokio::io::BufReader::new(stdin).lines();
    let mut pending: Option<PendingBatch> = None;

    loop {
        eprint!("> ");
        // Flush stderr so the prompt appears before blocking on read.
        use std::io::Write;
        std::io::stderr().flush().ok();

        let Some(line) = reader.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match ChatInput::parse(&line, pending.is_some()) {
            ChatInput::Quit => break,
            ChatInput::Help => print_help(),
            ChatInput::Status => println!("{}\n", format_status(&runtime.monitor.snapshot())),
            ChatInput::Stats => println!("{}\n", format_stats(&runtime.monitor.stats())),
            ChatInput::Invalid(reason) => println!("{reason}\n"),
            ChatInput::Discard => {
                pending = None;
                println!("discarded\n");
            }
            ChatInput::Confirm => {
                if let Some(batch) = pending.take() {
                    let rows = batch.clone().confirm();
                    match runtime.store.append(&rows).await {
                        Ok(()) => println!("saved {} transaction(s)\n", rows.len()),
                        Err(e) => {
                            warn!(error = %e, "store append failed");
                            println!("could not save: {e}. Send y to try again.\n");
                            pending = Some(batch);
                        }
                    }
                }
            }
            ChatInput::Edit { index, edit } => {
                if let Some(batch) = pending.as_mut() {
                    match batch.edit(index, edit) {
                        Ok(()) => print_batch(batch),
                        Err(e) => println!("{e}\n"),
                    }
                }
            }
            ChatInput::Message(text) => {
                if pending.take().is_some() {
                    println!("(previous batch discarded)");
                }
                match runtime.pipeline.process(args.user_id, &text).await {
                    Ok(batch) => {
                        print_batch(&batch);
                        pending = Some(batch);
                    }
                    Err(PipelineError::Parse(e)) => println!("could not find a transaction: {e}\n"),
                    Err(e) => println!("{e}\n"),
                }
            }
        }
    }

    Ok(())
}

fn print_batch(batch: &PendingBatch) {
    println!("{}", batch.format_for_user());
    println!();
    println!("y -- save, n -- discard, c <n> <category>, d <n> <text>, a <n> <amount>");
    println!();
}

fn print_help() {
    println!("Commands:");
    println!("  <text>               -- Parse a message into transactions");
    println!("  y / n                -- Save or discard the pending batch");
    println!("  c <n> <category>     -- Change the category of transaction n");
    println!("  d <n> <text>         -- Change the description of transaction n");
    println!("  a <n> <amount>       -- Change the amount of transaction n");
    println!("  /status              -- Health snapshot");
    println!("  /stats               -- Request statistics");
    println!("  /exit                -- Quit the session");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn slash_commands_work_without_batch() {
        assert_eq!(ChatInput::parse("/status", false), ChatInput::Status);
        assert_eq!(ChatInput::parse(" /stats ", true), ChatInput::Stats);
        assert_eq!(ChatInput::parse("/quit", false), ChatInput::Quit);
    }

    #[test]
    fn confirmation_needs_pending_batch() {
        assert_eq!(ChatInput::parse("y", true), ChatInput::Confirm);
        assert_eq!(ChatInput::parse("Да", true), ChatInput::Confirm);
        assert_eq!(ChatInput::parse("n", true), ChatInput::Discard);
        assert_eq!(ChatInput::parse("y", false), ChatInput::Message("y".into()));
    }

    #[test]
    fn edits_are_one_based() {
        assert_eq!(
            ChatInput::parse("c 2 Taxi", true),
            ChatInput::Edit {
                index: 1,
                edit: CandidateEdit::Category("Taxi".into()),
            }
        );
        assert_eq!(
            ChatInput::parse("d 1 бизнес ланч", true),
            ChatInput::Edit {
                index: 0,
                edit: CandidateEdit::Description("бизнес ланч".into()),
            }
        );
        assert_eq!(
            ChatInput::parse("a 1 1 500р", true),
            ChatInput::Edit {
                index: 0,
                edit: CandidateEdit::Amount(Decimal::from(1500)),
            }
        );
    }

    #[test]
    fn bad_edits_are_invalid() {
        assert!(matches!(ChatInput::parse("c 0 Food", true), ChatInput::Invalid(_)));
        assert!(matches!(ChatInput::parse("a 1 много", true), ChatInput::Invalid(_)));
        assert!(matches!(ChatInput::parse("c 1", true), ChatInput::Invalid(_)));
        assert!(matches!(ChatInput::parse("c x Food", true), ChatInput::Invalid(_)));
    }

    #[test]
    fn other_text_is_a_new_message() {
        assert_eq!(
            ChatInput::parse("кофе 250", true),
            ChatInput::Message("кофе 250".into())
        );
    }
}
