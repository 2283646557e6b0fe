//! Purchase reconciliation
//!
//! The billing provider may deliver the same PURCHASED event more than once:
//! on app restart, after a crash mid-verification, or when a restored-purchase
//! query fires alongside a live purchase. The reconciler makes each purchase
//! token reach backend verification at most once by combining the persisted
//! processed-token set in the profile with an in-memory in-flight set, both
//! checked-and-marked under one lock.
//!
//! Credits are never granted on the client's say-so. The sequence on a fresh
//! token is: verify with the backend, persist the token as processed, update
//! the cached balance, and only then signal the billing gateway to consume.
//! A failed verification releases the token so the caller can retry.

use std::collections::HashSet;
use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::api::client::{ApiError, ChatBackend};
use crate::api::PurchaseRequest;
use crate::core::profile::{ProfileError, ProfileStore};

/// Purchase state as reported by the billing provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseState {
    Purchased,
    Pending,
    Unspecified,
}

/// One purchase event delivered by the billing provider.
#[derive(Debug, Clone)]
pub struct PurchaseEvent {
    pub token: String,
    pub product_id: String,
    pub state: PurchaseState,
}

/// Billing-provider collaborator. Consumption makes the product purchasable
/// again and must only happen after the backend has granted the credits;
/// until then the provider keeps redelivering the event, which is what lets
/// an interrupted verification recover.
#[async_trait]
pub trait BillingGateway: Send + Sync {
    async fn consume(&self, token: &str) -> Result<(), Box<dyn StdError + Send + Sync>>;
}

/// Terminal result of reconciling one event.
#[derive(Debug, PartialEq, Eq)]
pub enum PurchaseOutcome {
    /// The backend verified the token and granted credits.
    Granted { chats_added: i64, remaining: i64 },

    /// The token was already verified earlier; nothing was sent anywhere.
    AlreadyProcessed,

    /// Another delivery of this token is being verified right now.
    InFlight,

    /// The event was not in the PURCHASED state.
    Ignored,
}

#[derive(Debug)]
pub enum PurchaseError {
    /// Verification never completed; the token stays unprocessed and the
    /// caller may retry.
    Backend(ApiError),

    /// The backend refused the token; no credits were granted.
    Rejected { message: Option<String> },

    /// The token could not be persisted as processed. The backend may
    /// already have granted the credits; replaying the token is safe because
    /// the backend treats an already-redeemed token as a zero-credit grant.
    Ledger(ProfileError),
}

impl fmt::Display for PurchaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PurchaseError::Backend(e) => write!(f, "Purchase verification failed: {e}"),
            PurchaseError::Rejected { message } => match message {
                Some(msg) => write!(f, "Backend rejected the purchase: {msg}"),
                None => write!(f, "Backend rejected the purchase"),
            },
            PurchaseError::Ledger(e) => write!(f, "Could not record the purchase: {e}"),
        }
    }
}

impl StdError for PurchaseError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            PurchaseError::Backend(e) => Some(e),
            PurchaseError::Ledger(e) => Some(e),
            PurchaseError::Rejected { .. } => None,
        }
    }
}

enum Claim {
    Acquired,
    Completed,
    InFlight,
}

/// Drives purchase events to a terminal state: verified-and-consumed, or
/// released for retry.
pub struct PurchaseReconciler {
    backend: Arc<dyn ChatBackend>,
    billing: Arc<dyn BillingGateway>,
    store: Arc<ProfileStore>,
    in_flight: Mutex<HashSet<String>>,
}

impl PurchaseReconciler {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        billing: Arc<dyn BillingGateway>,
        store: Arc<ProfileStore>,
    ) -> Self {
        PurchaseReconciler {
            backend,
            billing,
            store,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub async fn reconcile(
        &self,
        email: &str,
        event: &PurchaseEvent,
    ) -> Result<PurchaseOutcome, PurchaseError> {
        if event.state != PurchaseState::Purchased {
            debug!("ignoring purchase event in state {:?}", event.state);
            return Ok(PurchaseOutcome::Ignored);
        }

        match self.claim(&event.token) {
            Claim::Completed => {
                debug!("skipping already-processed purchase token");
                return Ok(PurchaseOutcome::AlreadyProcessed);
            }
            Claim::InFlight => {
                debug!("duplicate delivery while verification is in flight");
                return Ok(PurchaseOutcome::InFlight);
            }
            Claim::Acquired => {}
        }

        let result = self.verify_and_grant(email, event).await;
        self.release(&event.token);
        result
    }

    /// Atomic check-and-mark. Holding the in-flight lock while consulting
    /// the persisted set is what closes the read-then-write race between two
    /// concurrent deliveries of the same token.
    fn claim(&self, token: &str) -> Claim {
        let mut in_flight = self.in_flight.lock().unwrap();
        if self.store.is_token_processed(token) {
            Claim::Completed
        } else if in_flight.insert(token.to_string()) {
            Claim::Acquired
        } else {
            Claim::InFlight
        }
    }

    fn release(&self, token: &str) {
        self.in_flight.lock().unwrap().remove(token);
    }

    async fn verify_and_grant(
        &self,
        email: &str,
        event: &PurchaseEvent,
    ) -> Result<PurchaseOutcome, PurchaseError> {
        let req = PurchaseRequest {
            email: email.to_string(),
            purchase_token: event.token.clone(),
            product_id: event.product_id.clone(),
        };

        let response = self
            .backend
            .verify_purchase(&req)
            .await
            .map_err(PurchaseError::Backend)?;

        if !response.success {
            warn!("backend rejected purchase of {}", event.product_id);
            return Err(PurchaseError::Rejected {
                message: response.message,
            });
        }

        // The token must be durable before anyone hears about the grant;
        // only a crash between the backend's commit and this write can cause
        // a duplicate submission, and the backend answers those with a
        // zero-credit grant.
        self.store
            .mark_token_processed(&event.token)
            .map_err(PurchaseError::Ledger)?;

        let remaining = match response.remaining_chats {
            Some(n) => {
                self.store
                    .set_cached_chats(email, n)
                    .map_err(PurchaseError::Ledger)?;
                n
            }
            None => self.store.cached_chats(email).unwrap_or(0),
        };

        let chats_added = response.chats_added.unwrap_or(0);
        info!("purchase verified: +{chats_added} chats, {remaining} remaining");

        // The grant is already durable; a failed consume just means the
        // provider redelivers the event later and the ledger skips it.
        if let Err(e) = self.billing.consume(&event.token).await {
            warn!("failed to consume purchase with billing provider: {e}");
        }

        Ok(PurchaseOutcome::Granted {
            chats_added,
            remaining,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PurchaseResponse;
    use crate::core::constants::PRODUCT_5_CHATS;
    use crate::utils::test_utils::{transport_error, FakeBackend, RecordingBilling};
    use tempfile::TempDir;

    const EMAIL: &str = "a@example.com";

    fn purchased(token: &str) -> PurchaseEvent {
        PurchaseEvent {
            token: token.to_string(),
            product_id: PRODUCT_5_CHATS.to_string(),
            state: PurchaseState::Purchased,
        }
    }

    fn granted(chats_added: i64, remaining: i64) -> PurchaseResponse {
        PurchaseResponse {
            success: true,
            chats_added: Some(chats_added),
            remaining_chats: Some(remaining),
            message: None,
        }
    }

    struct Fixture {
        backend: Arc<FakeBackend>,
        billing: Arc<RecordingBilling>,
        store: Arc<ProfileStore>,
        reconciler: Arc<PurchaseReconciler>,
    }

    fn setup(dir: &TempDir) -> Fixture {
        let backend = Arc::new(FakeBackend::default());
        let billing = Arc::new(RecordingBilling::default());
        let store = Arc::new(
            ProfileStore::open(dir.path().join("profile.toml")).expect("open store"),
        );
        let reconciler = Arc::new(PurchaseReconciler::new(
            backend.clone(),
            billing.clone(),
            store.clone(),
        ));
        Fixture {
            backend,
            billing,
            store,
            reconciler,
        }
    }

    #[tokio::test]
    async fn grant_updates_cache_and_consumes() {
        let dir = TempDir::new().unwrap();
        let fx = setup(&dir);
        fx.store.set_cached_chats(EMAIL, 0).unwrap();
        fx.backend.push_verify(Ok(granted(5, 5)));

        let outcome = fx
            .reconciler
            .reconcile(EMAIL, &purchased("token-1"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PurchaseOutcome::Granted {
                chats_added: 5,
                remaining: 5
            }
        );
        assert_eq!(fx.store.cached_chats(EMAIL), Some(5));
        assert!(fx.store.is_token_processed("token-1"));
        assert_eq!(fx.backend.verify_calls(), 1);
        assert_eq!(fx.billing.consumed(), vec!["token-1".to_string()]);
    }

    #[tokio::test]
    async fn replay_after_success_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let fx = setup(&dir);
        fx.backend.push_verify(Ok(granted(5, 5)));

        fx.reconciler
            .reconcile(EMAIL, &purchased("token-1"))
            .await
            .unwrap();

        let outcome = fx
            .reconciler
            .reconcile(EMAIL, &purchased("token-1"))
            .await
            .unwrap();
        assert_eq!(outcome, PurchaseOutcome::AlreadyProcessed);
        assert_eq!(fx.backend.verify_calls(), 1);
        assert_eq!(fx.billing.consumed().len(), 1);
        assert_eq!(fx.store.cached_chats(EMAIL), Some(5));
    }

    #[tokio::test]
    async fn replay_after_restart_is_still_skipped() {
        let dir = TempDir::new().unwrap();
        {
            let fx = setup(&dir);
            fx.backend.push_verify(Ok(granted(5, 5)));
            fx.reconciler
                .reconcile(EMAIL, &purchased("token-1"))
                .await
                .unwrap();
        }

        // Fresh components over the same profile file, as after a restart.
        let fx = setup(&dir);
        let outcome = fx
            .reconciler
            .reconcile(EMAIL, &purchased("token-1"))
            .await
            .unwrap();
        assert_eq!(outcome, PurchaseOutcome::AlreadyProcessed);
        assert_eq!(fx.backend.verify_calls(), 0);
        assert!(fx.billing.consumed().is_empty());
    }

    #[tokio::test]
    async fn rejected_token_stays_unprocessed_and_can_retry() {
        let dir = TempDir::new().unwrap();
        let fx = setup(&dir);
        fx.store.set_cached_chats(EMAIL, 2).unwrap();
        fx.backend.push_verify(Ok(PurchaseResponse {
            success: false,
            chats_added: None,
            remaining_chats: None,
            message: Some("token not found".to_string()),
        }));

        let err = fx
            .reconciler
            .reconcile(EMAIL, &purchased("token-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, PurchaseError::Rejected { .. }));
        assert!(!fx.store.is_token_processed("token-1"));
        assert!(fx.billing.consumed().is_empty());
        assert_eq!(fx.store.cached_chats(EMAIL), Some(2));

        // The retry goes back to the backend: one failed and one successful
        // submission is the allowed maximum.
        fx.backend.push_verify(Ok(granted(5, 7)));
        let outcome = fx
            .reconciler
            .reconcile(EMAIL, &purchased("token-1"))
            .await
            .unwrap();
        assert!(matches!(outcome, PurchaseOutcome::Granted { .. }));
        assert_eq!(fx.backend.verify_calls(), 2);
    }

    #[tokio::test]
    async fn transport_failure_releases_the_token() {
        let dir = TempDir::new().unwrap();
        let fx = setup(&dir);
        fx.backend.push_verify(Err(transport_error("purchase/verify")));

        let err = fx
            .reconciler
            .reconcile(EMAIL, &purchased("token-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, PurchaseError::Backend(_)));
        assert!(!fx.store.is_token_processed("token-1"));

        fx.backend.push_verify(Ok(granted(5, 5)));
        let outcome = fx
            .reconciler
            .reconcile(EMAIL, &purchased("token-1"))
            .await
            .unwrap();
        assert!(matches!(outcome, PurchaseOutcome::Granted { .. }));
    }

    #[tokio::test]
    async fn failed_consume_does_not_undo_the_grant() {
        let dir = TempDir::new().unwrap();
        let fx = setup(&dir);
        fx.backend.push_verify(Ok(granted(5, 5)));
        fx.billing.fail_next_consume();

        let outcome = fx
            .reconciler
            .reconcile(EMAIL, &purchased("token-1"))
            .await
            .unwrap();
        assert!(matches!(outcome, PurchaseOutcome::Granted { .. }));
        // The ledger entry survives, so the provider's redelivery is skipped
        // instead of producing a second grant.
        assert!(fx.store.is_token_processed("token-1"));
        let replay = fx
            .reconciler
            .reconcile(EMAIL, &purchased("token-1"))
            .await
            .unwrap();
        assert_eq!(replay, PurchaseOutcome::AlreadyProcessed);
        assert_eq!(fx.backend.verify_calls(), 1);
    }

    #[tokio::test]
    async fn non_purchased_states_are_ignored() {
        let dir = TempDir::new().unwrap();
        let fx = setup(&dir);

        let event = PurchaseEvent {
            token: "token-1".to_string(),
            product_id: PRODUCT_5_CHATS.to_string(),
            state: PurchaseState::Pending,
        };
        let outcome = fx.reconciler.reconcile(EMAIL, &event).await.unwrap();
        assert_eq!(outcome, PurchaseOutcome::Ignored);
        assert_eq!(fx.backend.verify_calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_deliveries_submit_once() {
        let dir = TempDir::new().unwrap();
        let fx = setup(&dir);
        fx.backend.set_verify_delay_ms(50);
        fx.backend.push_verify(Ok(granted(5, 5)));
        fx.backend.push_verify(Ok(granted(5, 10)));

        // A restored-purchase query firing alongside the live purchase
        // delivers the same token twice, concurrently.
        let first = {
            let reconciler = fx.reconciler.clone();
            tokio::spawn(async move { reconciler.reconcile(EMAIL, &purchased("token-1")).await })
        };
        let second = {
            let reconciler = fx.reconciler.clone();
            tokio::spawn(async move { reconciler.reconcile(EMAIL, &purchased("token-1")).await })
        };

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        let granted_count = [&first, &second]
            .iter()
            .filter(|o| matches!(o, PurchaseOutcome::Granted { .. }))
            .count();
        let skipped_count = [&first, &second]
            .iter()
            .filter(|o| {
                matches!(
                    o,
                    PurchaseOutcome::InFlight | PurchaseOutcome::AlreadyProcessed
                )
            })
            .count();
        assert_eq!(granted_count, 1);
        assert_eq!(skipped_count, 1);
        assert_eq!(fx.backend.verify_calls(), 1);
        assert_eq!(fx.billing.consumed().len(), 1);
    }
}
