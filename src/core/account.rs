//! Account registration and sign-in
//!
//! The backend keys everything by email and normalizes it to trimmed
//! lowercase; the client mirrors that normalization before any request so the
//! quota cache and the processed-purchase ledger never fork across
//! capitalization variants of the same account.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::api::client::{ApiError, ChatBackend};
use crate::api::{LoginRequest, RegisterRequest};
use crate::core::profile::{ProfileError, ProfileStore};

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Result of a successful register or login: the active account and the
/// balance the backend reported for it.
#[derive(Debug)]
pub struct AccountSession {
    pub email: String,
    pub chats: i64,
}

#[derive(Debug)]
pub enum AccountError {
    Backend(ApiError),
    /// The backend answered but refused the credentials.
    Rejected(String),
    Profile(ProfileError),
}

impl fmt::Display for AccountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountError::Backend(e) => write!(f, "{e}"),
            AccountError::Rejected(msg) => write!(f, "{msg}"),
            AccountError::Profile(e) => write!(f, "{e}"),
        }
    }
}

impl StdError for AccountError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            AccountError::Backend(e) => Some(e),
            AccountError::Profile(e) => Some(e),
            AccountError::Rejected(_) => None,
        }
    }
}

pub struct AccountManager {
    backend: Arc<dyn ChatBackend>,
    store: Arc<ProfileStore>,
}

impl AccountManager {
    pub fn new(backend: Arc<dyn ChatBackend>, store: Arc<ProfileStore>) -> Self {
        AccountManager { backend, store }
    }

    /// Create a new account. New accounts start with a couple of free chats,
    /// granted by the backend; the reported balance seeds the local cache.
    pub async fn register(
        &self,
        email: &str,
        age: u32,
        sex: &str,
        password: &str,
    ) -> Result<AccountSession, AccountError> {
        let email = normalize_email(email);
        let req = RegisterRequest {
            email: email.clone(),
            age,
            sex: sex.to_string(),
            password: password.to_string(),
        };

        let response = self
            .backend
            .register(&req)
            .await
            .map_err(AccountError::Backend)?;

        // The backend reports duplicate accounts and validation problems in
        // the body, not the status line.
        if let Some(error) = response.error {
            return Err(AccountError::Rejected(error));
        }

        let chats = response.chats.unwrap_or(0);
        self.persist_session(&email, chats)?;
        info!("registered {email} with {chats} starter chats");
        Ok(AccountSession { email, chats })
    }

    /// Sign in and make this email the active profile.
    pub async fn login(&self, email: &str, password: &str) -> Result<AccountSession, AccountError> {
        let email = normalize_email(email);
        let req = LoginRequest {
            email: email.clone(),
            password: password.to_string(),
        };

        let response = self
            .backend
            .login(&req)
            .await
            .map_err(AccountError::Backend)?;

        if let Some(error) = response.error {
            return Err(AccountError::Rejected(error));
        }

        let chats = response.chats.unwrap_or(0);
        self.persist_session(&email, chats)?;
        info!("signed in as {email}");
        Ok(AccountSession { email, chats })
    }

    fn persist_session(&self, email: &str, chats: i64) -> Result<(), AccountError> {
        self.store
            .set_active_email(email)
            .map_err(AccountError::Profile)?;
        self.store
            .set_cached_chats(email, chats)
            .map_err(AccountError::Profile)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{LoginResponse, RegisterResponse};
    use crate::utils::test_utils::FakeBackend;
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (Arc<FakeBackend>, Arc<ProfileStore>, AccountManager) {
        let backend = Arc::new(FakeBackend::default());
        let store = Arc::new(
            ProfileStore::open(dir.path().join("profile.toml")).expect("open store"),
        );
        let manager = AccountManager::new(backend.clone(), store.clone());
        (backend, store, manager)
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  User@Example.COM "), "user@example.com");
        assert_eq!(normalize_email("plain@example.com"), "plain@example.com");
    }

    #[tokio::test]
    async fn register_persists_email_and_starter_chats() {
        let dir = TempDir::new().unwrap();
        let (backend, store, manager) = setup(&dir);
        backend.push_register(Ok(RegisterResponse {
            success: Some("New User Created".to_string()),
            chats: Some(2),
            error: None,
        }));

        let session = manager
            .register(" New@Example.com ", 30, "f", "hunter22")
            .await
            .unwrap();
        assert_eq!(session.email, "new@example.com");
        assert_eq!(session.chats, 2);
        assert_eq!(store.active_email().as_deref(), Some("new@example.com"));
        assert_eq!(store.cached_chats("new@example.com"), Some(2));
    }

    #[tokio::test]
    async fn rejected_login_leaves_profile_untouched() {
        let dir = TempDir::new().unwrap();
        let (backend, store, manager) = setup(&dir);
        backend.push_login(Ok(LoginResponse {
            success: None,
            email: None,
            chats: None,
            error: Some("Incorrect password".to_string()),
        }));

        let err = manager.login("a@example.com", "nope").await.unwrap_err();
        assert!(matches!(err, AccountError::Rejected(_)));
        assert!(store.active_email().is_none());
    }

    #[tokio::test]
    async fn login_seeds_quota_cache() {
        let dir = TempDir::new().unwrap();
        let (backend, store, manager) = setup(&dir);
        backend.push_login(Ok(LoginResponse {
            success: Some("Login successful".to_string()),
            email: Some("a@example.com".to_string()),
            chats: Some(11),
            error: None,
        }));

        let session = manager.login("a@example.com", "pw").await.unwrap();
        assert_eq!(session.chats, 11);
        assert_eq!(store.cached_chats("a@example.com"), Some(11));
    }
}
