use std::error::Error;
use std::sync::Arc;

use crate::api::client::ChatBackend;
use crate::cli::require_email;
use crate::core::profile::ProfileStore;
use crate::core::quota::QuotaTracker;

pub async fn show_status(
    backend: Arc<dyn ChatBackend>,
    store: Arc<ProfileStore>,
) -> Result<(), Box<dyn Error>> {
    let email = require_email(&store)?;
    let tracker = QuotaTracker::new(backend, store);

    match tracker.refresh(&email).await {
        Ok(remaining) if remaining > 0 => {
            println!("💬 {email}: {remaining} chats remaining.");
        }
        Ok(_) => {
            println!("🚫 {email}: you've reached your chat limit.");
            println!("🛒 Redeem a purchase with `relief redeem <token>` to continue.");
        }
        Err(e) => {
            println!(
                "⚠️  Could not reach the backend ({e}). Last known balance: {}.",
                tracker.cached(&email)
            );
        }
    }
    Ok(())
}
