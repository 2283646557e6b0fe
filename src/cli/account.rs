use std::error::Error;
use std::sync::Arc;

use crate::api::client::ChatBackend;
use crate::core::account::AccountManager;
use crate::core::profile::ProfileStore;

pub async fn register(
    backend: Arc<dyn ChatBackend>,
    store: Arc<ProfileStore>,
    email: &str,
    age: u32,
    sex: &str,
    password: &str,
) -> Result<(), Box<dyn Error>> {
    let manager = AccountManager::new(backend, store);
    let session = manager.register(email, age, sex, password).await?;
    println!("✅ Account created for {}.", session.email);
    println!("💬 You have {} free chats to get started.", session.chats);
    Ok(())
}

pub async fn login(
    backend: Arc<dyn ChatBackend>,
    store: Arc<ProfileStore>,
    email: &str,
    password: &str,
) -> Result<(), Box<dyn Error>> {
    let manager = AccountManager::new(backend, store);
    let session = manager.login(email, password).await?;
    if session.chats > 0 {
        println!(
            "✅ Signed in as {} — {} chats remaining.",
            session.email, session.chats
        );
    } else {
        println!("✅ Signed in as {}.", session.email);
        println!("🛒 You have no chats left. Redeem a purchase with `relief redeem <token>`.");
    }
    Ok(())
}
