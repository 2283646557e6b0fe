//! Interactive chat loop
//!
//! A plain line-oriented loop on stdin/stdout. Replies and balances come
//! straight from the [`QuotaTracker`]; the loop itself never does credit
//! arithmetic.

use std::error::Error;
use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::api::client::ChatBackend;
use crate::cli::require_email;
use crate::core::profile::ProfileStore;
use crate::core::quota::{ChatOutcome, QuotaTracker};

pub async fn run_chat(
    backend: Arc<dyn ChatBackend>,
    store: Arc<ProfileStore>,
    session: &str,
) -> Result<(), Box<dyn Error>> {
    let email = require_email(&store)?;
    let tracker = QuotaTracker::new(backend, store);

    match tracker.refresh(&email).await {
        Ok(remaining) => {
            println!("💬 Signed in as {email} — {remaining} chats remaining.");
        }
        Err(e) => {
            // Fail soft: chat can still start against the last known balance.
            println!(
                "⚠️  Could not refresh your balance ({e}). Last known: {}.",
                tracker.cached(&email)
            );
        }
    }
    println!("Type a message and press Enter. /quit or Ctrl+D to leave.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let message = line.trim();
        if message.is_empty() {
            prompt()?;
            continue;
        }
        if message == "/quit" {
            break;
        }

        match tracker.send(&email, message, session).await {
            Ok(ChatOutcome::Reply { text, remaining }) => {
                println!("{text}");
                println!("({remaining} chats left)");
                if remaining == 0 {
                    println!("🛒 That was your last chat. Redeem a purchase to keep going.");
                }
            }
            Ok(ChatOutcome::Exhausted { .. }) => {
                println!("🚫 No chats left. Redeem a purchase with `relief redeem <token>`.");
                // Reconcile the display with the backend's ledger; the gate
                // stays engaged until this reports a positive balance.
                if let Ok(remaining) = tracker.refresh(&email).await {
                    println!("(backend reports {remaining} chats)");
                }
            }
            Err(e) => {
                println!("⚠️  Network error. Please try again. ({e})");
            }
        }
        prompt()?;
    }

    println!("👋 Bye.");
    Ok(())
}

fn prompt() -> Result<(), Box<dyn Error>> {
    print!("> ");
    std::io::stdout().flush()?;
    Ok(())
}
