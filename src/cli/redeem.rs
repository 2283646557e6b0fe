//! Purchase redemption
//!
//! The billing provider hands out one purchase token per purchase attempt;
//! this command feeds such a token through the reconciler. On a desktop
//! terminal there is no billing SDK to call back into, so the gateway here
//! just reports the consume signal; the reconciler's ordering guarantees are
//! identical either way.

use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::api::client::ChatBackend;
use crate::cli::require_email;
use crate::core::constants::chats_for_product;
use crate::core::profile::ProfileStore;
use crate::core::purchase::{
    BillingGateway, PurchaseEvent, PurchaseOutcome, PurchaseReconciler, PurchaseState,
};

struct ConsoleBilling;

#[async_trait]
impl BillingGateway for ConsoleBilling {
    async fn consume(&self, token: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        info!("consume signaled for purchase token {token}");
        Ok(())
    }
}

pub async fn redeem(
    backend: Arc<dyn ChatBackend>,
    store: Arc<ProfileStore>,
    token: String,
    product: String,
) -> Result<(), Box<dyn Error>> {
    let email = require_email(&store)?;

    if let Some(chats) = chats_for_product(&product) {
        println!("🧾 Redeeming a {chats}-chat pack for {email}...");
    } else {
        println!("🧾 Redeeming product {product} for {email}...");
    }

    let reconciler = PurchaseReconciler::new(backend, Arc::new(ConsoleBilling), store);
    let event = PurchaseEvent {
        token,
        product_id: product,
        state: PurchaseState::Purchased,
    };

    let outcome = match reconciler.reconcile(&email, &event).await {
        Ok(outcome) => outcome,
        Err(e) => {
            println!("⚠️  No credits were granted; this purchase token can be retried.");
            return Err(e.into());
        }
    };

    match outcome {
        PurchaseOutcome::Granted {
            chats_added,
            remaining,
        } => {
            println!("✅ Purchase verified: +{chats_added} chats.");
            println!("💬 You now have {remaining} chats.");
        }
        PurchaseOutcome::AlreadyProcessed => {
            println!("ℹ️  This purchase token was already redeemed; nothing to do.");
        }
        PurchaseOutcome::InFlight => {
            println!("ℹ️  This purchase token is already being processed.");
        }
        PurchaseOutcome::Ignored => {
            println!("⚠️  This purchase is not in a redeemable state.");
        }
    }
    Ok(())
}
