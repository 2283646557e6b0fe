//! Quota tracking
//!
//! The backend is the sole authority on how many chats an account has left;
//! this tracker only mirrors it. Every successful response overwrites the
//! cached balance wholesale (there is no client-side decrement, which would
//! drift as soon as a second device shares the account), and failed requests
//! never touch the cache.

use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::api::client::{ApiError, ChatBackend};
use crate::api::{AccountRequest, ChatRequest};
use crate::core::profile::{ProfileError, ProfileStore};

/// Result of one chat round-trip.
#[derive(Debug)]
pub enum ChatOutcome {
    /// The backend accepted the message and returned the assistant's reply
    /// along with the authoritative remaining balance.
    Reply { text: String, remaining: i64 },

    /// The backend refused the message: either `allowed=false` in the body or
    /// a non-success HTTP status. The tracker is gated until a refresh
    /// reports a positive balance again.
    Exhausted { remaining: i64 },
}

#[derive(Debug)]
pub enum QuotaError {
    /// The request never completed; the cached balance is unchanged.
    Backend(ApiError),

    /// The backend answered but reported an application error.
    Denied(String),

    /// The fresh balance could not be persisted.
    Profile(ProfileError),
}

impl fmt::Display for QuotaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaError::Backend(e) => write!(f, "{e}"),
            QuotaError::Denied(msg) => write!(f, "Backend rejected the request: {msg}"),
            QuotaError::Profile(e) => write!(f, "{e}"),
        }
    }
}

impl StdError for QuotaError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            QuotaError::Backend(e) => Some(e),
            QuotaError::Profile(e) => Some(e),
            QuotaError::Denied(_) => None,
        }
    }
}

/// Mirrors the backend's remaining-chat ledger for one account session.
pub struct QuotaTracker {
    backend: Arc<dyn ChatBackend>,
    store: Arc<ProfileStore>,
    /// Engaged when the backend refuses a chat; cleared by a refresh that
    /// reports a positive balance. While gated, `send` rejects locally
    /// without a network call.
    gated: Mutex<bool>,
}

impl QuotaTracker {
    pub fn new(backend: Arc<dyn ChatBackend>, store: Arc<ProfileStore>) -> Self {
        QuotaTracker {
            backend,
            store,
            gated: Mutex::new(false),
        }
    }

    /// Last balance reported by the backend, or 0 if this email has never
    /// been synchronized.
    pub fn cached(&self, email: &str) -> i64 {
        self.store.cached_chats(email).unwrap_or(0)
    }

    pub fn is_gated(&self) -> bool {
        *self.gated.lock().unwrap()
    }

    /// Fetch the authoritative balance from the backend and overwrite the
    /// cache with it. On failure the cache keeps its previous value; callers
    /// fall back to [`QuotaTracker::cached`].
    pub async fn refresh(&self, email: &str) -> Result<i64, QuotaError> {
        let req = AccountRequest {
            email: email.to_string(),
        };
        let response = self
            .backend
            .remaining_chats(&req)
            .await
            .map_err(QuotaError::Backend)?;

        let remaining = match response.chats {
            Some(n) => n,
            None => {
                let msg = response
                    .error
                    .unwrap_or_else(|| "no balance in response".to_string());
                warn!("quota refresh for {email} denied: {msg}");
                return Err(QuotaError::Denied(msg));
            }
        };

        self.store
            .set_cached_chats(email, remaining)
            .map_err(QuotaError::Profile)?;

        if remaining > 0 {
            *self.gated.lock().unwrap() = false;
        }
        debug!("quota refreshed for {email}: {remaining}");
        Ok(remaining)
    }

    /// Send one chat message. While gated this returns
    /// [`ChatOutcome::Exhausted`] without touching the network.
    pub async fn send(
        &self,
        email: &str,
        message: &str,
        session_id: &str,
    ) -> Result<ChatOutcome, QuotaError> {
        if self.is_gated() {
            debug!("chat send suppressed: quota gate engaged");
            return Ok(ChatOutcome::Exhausted {
                remaining: self.cached(email),
            });
        }

        let req = ChatRequest {
            email: email.to_string(),
            message: message.to_string(),
            session_id: session_id.to_string(),
        };

        let reply = match self.backend.chat(&req).await {
            Ok(reply) => reply,
            // An HTTP error status (e.g. 429) is the backend refusing the
            // chat, not the network failing: gate and report exhaustion with
            // the cache left exactly as it was.
            Err(e) if e.is_status() => {
                warn!("chat refused for {email}: {e}");
                *self.gated.lock().unwrap() = true;
                return Ok(ChatOutcome::Exhausted {
                    remaining: self.cached(email),
                });
            }
            Err(e) => return Err(QuotaError::Backend(e)),
        };

        if reply.allowed == Some(false) {
            let remaining = reply.chats.unwrap_or(0);
            self.store
                .set_cached_chats(email, remaining)
                .map_err(QuotaError::Profile)?;
            *self.gated.lock().unwrap() = true;
            return Ok(ChatOutcome::Exhausted { remaining });
        }

        let text = match reply.reply {
            Some(text) => text,
            None => {
                let msg = reply
                    .error
                    .unwrap_or_else(|| "empty reply from backend".to_string());
                return Err(QuotaError::Denied(msg));
            }
        };

        let remaining = reply.chats.unwrap_or(0);
        self.store
            .set_cached_chats(email, remaining)
            .map_err(QuotaError::Profile)?;

        Ok(ChatOutcome::Reply { text, remaining })
    }
}
