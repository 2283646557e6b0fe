//! Persisted local profile
//!
//! The profile is the client's only durable state: the active account email,
//! the last known chat balance per email, and the set of purchase tokens that
//! have already been submitted to backend verification. It lives in a single
//! TOML file under the platform config directory and is rewritten atomically
//! (write to a temp file in the same directory, then rename) so a crash
//! mid-save never leaves a half-written profile behind.

use std::collections::{BTreeMap, BTreeSet};
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

const PROFILE_FILE: &str = "profile.toml";

/// Errors that can occur while loading or saving the profile.
#[derive(Debug)]
pub enum ProfileError {
    /// Failed to read the profile file from disk.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse the profile file as valid TOML.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Failed to write the profile file back to disk.
    Write {
        path: PathBuf,
        source: Box<dyn StdError + Send + Sync>,
    },

    /// No platform config directory could be determined.
    NoProfileDir,
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileError::Read { path, source } => {
                write!(f, "Failed to read profile at {}: {}", path.display(), source)
            }
            ProfileError::Parse { path, source } => {
                write!(
                    f,
                    "Failed to parse profile at {}: {}",
                    path.display(),
                    source
                )
            }
            ProfileError::Write { path, source } => {
                write!(
                    f,
                    "Failed to write profile at {}: {}",
                    path.display(),
                    source
                )
            }
            ProfileError::NoProfileDir => {
                write!(f, "Could not determine a config directory for this platform")
            }
        }
    }
}

impl StdError for ProfileError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ProfileError::Read { source, .. } => Some(source),
            ProfileError::Parse { source, .. } => Some(source),
            ProfileError::Write { source, .. } => Some(source.as_ref()),
            ProfileError::NoProfileDir => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Profile {
    /// Email of the signed-in account, if any.
    pub email: Option<String>,
    /// Backend base URL override; the built-in default applies when unset.
    pub base_url: Option<String>,
    /// Last known remaining-chat balance per account email.
    #[serde(default)]
    pub chats: BTreeMap<String, i64>,
    /// Purchase tokens already verified by the backend. Tokens are only added
    /// here after a successful `purchase/verify` response.
    #[serde(default)]
    pub processed_purchases: BTreeSet<String>,
}

impl Profile {
    pub fn load_from_path(path: &Path) -> Result<Profile, ProfileError> {
        if path.exists() {
            let contents = fs::read_to_string(path).map_err(|source| ProfileError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let profile: Profile =
                toml::from_str(&contents).map_err(|source| ProfileError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
            Ok(profile)
        } else {
            Ok(Profile::default())
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), ProfileError> {
        let write_err = |source: Box<dyn StdError + Send + Sync>| ProfileError::Write {
            path: path.to_path_buf(),
            source,
        };

        let parent = path.parent().filter(|dir| !dir.as_os_str().is_empty());

        if let Some(dir) = parent {
            fs::create_dir_all(dir).map_err(|e| write_err(Box::new(e)))?;
        }

        let contents = toml::to_string_pretty(self).map_err(|e| write_err(Box::new(e)))?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(|e| write_err(Box::new(e)))?;

        temp_file
            .write_all(contents.as_bytes())
            .map_err(|e| write_err(Box::new(e)))?;
        temp_file
            .as_file_mut()
            .sync_all()
            .map_err(|e| write_err(Box::new(e)))?;
        temp_file.persist(path).map_err(|e| write_err(Box::new(e)))?;
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf, ProfileError> {
        let proj_dirs =
            ProjectDirs::from("org", "permacommons", "relief").ok_or(ProfileError::NoProfileDir)?;
        Ok(proj_dirs.config_dir().join(PROFILE_FILE))
    }
}

/// Shared handle to the persisted profile.
///
/// Every mutation goes through [`ProfileStore::mutate`], which rewrites the
/// file before returning. That ordering is what makes the purchase ledger
/// safe: a token is durable on disk before the reconciler reports success.
pub struct ProfileStore {
    path: PathBuf,
    profile: Mutex<Profile>,
}

impl ProfileStore {
    pub fn open(path: PathBuf) -> Result<Self, ProfileError> {
        let profile = Profile::load_from_path(&path)?;
        Ok(ProfileStore {
            path,
            profile: Mutex::new(profile),
        })
    }

    pub fn open_default() -> Result<Self, ProfileError> {
        Self::open(Profile::default_path()?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Profile {
        self.profile.lock().unwrap().clone()
    }

    pub fn active_email(&self) -> Option<String> {
        self.profile.lock().unwrap().email.clone()
    }

    pub fn cached_chats(&self, email: &str) -> Option<i64> {
        self.profile.lock().unwrap().chats.get(email).copied()
    }

    pub fn is_token_processed(&self, token: &str) -> bool {
        self.profile
            .lock()
            .unwrap()
            .processed_purchases
            .contains(token)
    }

    pub fn set_active_email(&self, email: &str) -> Result<(), ProfileError> {
        self.mutate(|profile| {
            profile.email = Some(email.to_string());
        })
    }

    pub fn set_base_url(&self, base_url: &str) -> Result<(), ProfileError> {
        self.mutate(|profile| {
            profile.base_url = Some(base_url.to_string());
        })
    }

    pub fn set_cached_chats(&self, email: &str, chats: i64) -> Result<(), ProfileError> {
        self.mutate(|profile| {
            profile.chats.insert(email.to_string(), chats);
        })
    }

    pub fn mark_token_processed(&self, token: &str) -> Result<(), ProfileError> {
        self.mutate(|profile| {
            profile.processed_purchases.insert(token.to_string());
        })
    }

    /// Apply `mutator` to the in-memory profile and persist the result. The
    /// lock is held across the disk write, so concurrent mutations serialize
    /// and the file always matches the last in-memory state.
    fn mutate<F>(&self, mutator: F) -> Result<(), ProfileError>
    where
        F: FnOnce(&mut Profile),
    {
        let mut guard = self.profile.lock().unwrap();
        let mut working = guard.clone();
        mutator(&mut working);
        working.save_to_path(&self.path)?;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> ProfileStore {
        ProfileStore::open(dir.path().join("profile.toml")).expect("open failed")
    }

    #[test]
    fn test_load_nonexistent_profile_is_default() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let profile = Profile::load_from_path(&temp_dir.path().join("missing.toml"))
            .expect("load failed");
        assert!(profile.email.is_none());
        assert!(profile.chats.is_empty());
        assert!(profile.processed_purchases.is_empty());
    }

    #[test]
    fn test_save_and_reload_roundtrip() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("profile.toml");

        let mut profile = Profile::default();
        profile.email = Some("user@example.com".to_string());
        profile.chats.insert("user@example.com".to_string(), 7);
        profile
            .processed_purchases
            .insert("token-abc".to_string());
        profile.save_to_path(&path).expect("save failed");

        let reloaded = Profile::load_from_path(&path).expect("load failed");
        assert_eq!(reloaded.email.as_deref(), Some("user@example.com"));
        assert_eq!(reloaded.chats.get("user@example.com"), Some(&7));
        assert!(reloaded.processed_purchases.contains("token-abc"));
    }

    #[test]
    fn test_parse_error_reports_path() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("profile.toml");
        fs::write(&path, "email = [not toml").expect("write failed");

        let err = Profile::load_from_path(&path).expect_err("expected parse failure");
        assert!(matches!(err, ProfileError::Parse { .. }));
        assert!(err.to_string().contains("profile.toml"));
    }

    #[test]
    fn test_store_persists_mutations_across_reopen() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");

        {
            let store = store_in(&temp_dir);
            store
                .set_active_email("user@example.com")
                .expect("set email failed");
            store
                .set_cached_chats("user@example.com", 5)
                .expect("set chats failed");
            store
                .mark_token_processed("token-1")
                .expect("mark failed");
        }

        // Simulated restart: a fresh store over the same path sees everything.
        let store = store_in(&temp_dir);
        assert_eq!(store.active_email().as_deref(), Some("user@example.com"));
        assert_eq!(store.cached_chats("user@example.com"), Some(5));
        assert!(store.is_token_processed("token-1"));
        assert!(!store.is_token_processed("token-2"));
    }

    #[test]
    fn test_store_creates_parent_directories() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested = temp_dir.path().join("a").join("b").join("profile.toml");

        let store = ProfileStore::open(nested.clone()).expect("open failed");
        store.set_cached_chats("x@example.com", 1).expect("set failed");
        assert!(nested.exists());
    }
}
