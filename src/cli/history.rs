//! Chat history commands

use std::error::Error;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime};

use crate::api::client::ChatBackend;
use crate::api::{AccountRequest, HistoryRequest};
use crate::cli::require_email;
use crate::core::constants::HISTORY_FETCH_LIMIT;
use crate::core::profile::ProfileStore;

pub async fn list(
    backend: Arc<dyn ChatBackend>,
    store: Arc<ProfileStore>,
) -> Result<(), Box<dyn Error>> {
    let email = require_email(&store)?;
    let response = backend
        .history_list(&AccountRequest { email })
        .await?;

    if response.chats.is_empty() {
        println!("No past sessions.");
        return Ok(());
    }

    for session in &response.chats {
        println!(
            "[{}] {} — {} messages",
            session.id, session.title, session.message_count
        );
        if !session.preview.is_empty() {
            println!("    {}", session.preview);
        }
    }
    Ok(())
}

pub async fn show(
    backend: Arc<dyn ChatBackend>,
    store: Arc<ProfileStore>,
    session: &str,
) -> Result<(), Box<dyn Error>> {
    let email = require_email(&store)?;
    let response = backend
        .history_messages(&HistoryRequest {
            email,
            limit: HISTORY_FETCH_LIMIT,
            session_id: session.to_string(),
        })
        .await?;

    if response.messages.is_empty() {
        println!("No messages in session {session}.");
        return Ok(());
    }

    for message in &response.messages {
        let speaker = match message.role.as_str() {
            "user" => "You",
            _ => "Relief",
        };
        match message.timestamp.as_deref().map(format_timestamp) {
            Some(ts) => println!("[{ts}] {speaker}: {}", message.content),
            None => println!("{speaker}: {}", message.content),
        }
    }
    Ok(())
}

pub async fn hide(
    backend: Arc<dyn ChatBackend>,
    store: Arc<ProfileStore>,
) -> Result<(), Box<dyn Error>> {
    let email = require_email(&store)?;
    let response = backend.hide_history(&AccountRequest { email }).await?;

    if let Some(error) = response.error {
        return Err(error.into());
    }
    println!("✅ Your chat history is now hidden.");
    Ok(())
}

/// The backend stores timestamps as either RFC 3339 or bare
/// `YYYY-MM-DD HH:MM:SS`; unrecognized values pass through untouched.
fn format_timestamp(raw: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.format("%Y-%m-%d %H:%M").to_string();
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return dt.format("%Y-%m-%d %H:%M").to_string();
    }
    raw.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(
            format_timestamp("2025-11-03T09:15:00+00:00"),
            "2025-11-03 09:15"
        );
        assert_eq!(
            format_timestamp("2025-11-03 09:15:42"),
            "2025-11-03 09:15"
        );
        assert_eq!(format_timestamp("yesterday"), "yesterday");
    }
}
