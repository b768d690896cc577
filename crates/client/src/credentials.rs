//! Persisted credentials
//!
//! The sole authentication signal for this layer is local: a bearer token
//! string and a user JSON blob. Presence means "signed in", absence means
//! "signed out". The [`CredentialStore`] trait is the seam that lets tests
//! and embedders substitute their own storage.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::ClientError;

/// Local, synchronous storage for the session credentials.
pub trait CredentialStore: Send + Sync {
    fn load_token(&self) -> Option<String>;
    fn store_token(&self, token: &str) -> Result<(), ClientError>;
    /// The raw user blob as the backend handed it out at login.
    fn load_user(&self) -> Option<Value>;
    fn store_user(&self, user: &Value) -> Result<(), ClientError>;
    /// Remove both token and user blob. Signing out and defensive
    /// invalidation of a corrupt session both land here.
    fn clear(&self) -> Result<(), ClientError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<Value>,
}

/// File-backed credential store: one JSON file under the data directory.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Store under an explicit directory (`<dir>/credentials.json`).
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join("credentials.json"),
        }
    }

    /// Store under the default data directory (`~/.gigline`).
    pub fn default_location() -> Result<Self, ClientError> {
        let home = dirs::home_dir()
            .ok_or_else(|| ClientError::Credentials("no home directory".to_string()))?;
        Ok(Self::new(home.join(".gigline")))
    }

    fn read(&self) -> CredentialsFile {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return CredentialsFile::default(),
        };
        match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                // A corrupt file is the same as no credentials.
                warn!(
                    component = "credentials",
                    event = "credentials.file.corrupt",
                    path = %self.path.display(),
                    error = %e,
                    "Ignoring unparseable credentials file"
                );
                CredentialsFile::default()
            }
        }
    }

    fn write(&self, file: &CredentialsFile) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(file)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load_token(&self) -> Option<String> {
        self.read().token
    }

    fn store_token(&self, token: &str) -> Result<(), ClientError> {
        let mut file = self.read();
        file.token = Some(token.to_string());
        self.write(&file)
    }

    fn load_user(&self) -> Option<Value> {
        self.read().user
    }

    fn store_user(&self, user: &Value) -> Result<(), ClientError> {
        let mut file = self.read();
        file.user = Some(user.clone());
        self.write(&file)
    }

    fn clear(&self) -> Result<(), ClientError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory credential store for tests and embedders that manage
/// persistence themselves.
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<CredentialsFile>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        let store = Self::new();
        store
            .store_token(token)
            .unwrap_or_else(|_| unreachable!("memory store is infallible"));
        store
    }

    pub fn with_user(user: Value) -> Self {
        let store = Self::new();
        store
            .store_user(&user)
            .unwrap_or_else(|_| unreachable!("memory store is infallible"));
        store
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load_token(&self) -> Option<String> {
        self.inner.lock().map(|g| g.token.clone()).unwrap_or(None)
    }

    fn store_token(&self, token: &str) -> Result<(), ClientError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| ClientError::Credentials("store poisoned".to_string()))?;
        guard.token = Some(token.to_string());
        Ok(())
    }

    fn load_user(&self) -> Option<Value> {
        self.inner.lock().map(|g| g.user.clone()).unwrap_or(None)
    }

    fn store_user(&self, user: &Value) -> Result<(), ClientError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| ClientError::Credentials("store poisoned".to_string()))?;
        guard.user = Some(user.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| ClientError::Credentials("store poisoned".to_string()))?;
        guard.token = None;
        guard.user = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileCredentialStore::new(dir.path());

        assert_eq!(store.load_token(), None);
        store.store_token("tok-1").expect("store token");
        store
            .store_user(&serde_json::json!({"id": "u1", "role": "client"}))
            .expect("store user");

        // A second handle over the same directory sees both values.
        let reopened = FileCredentialStore::new(dir.path());
        assert_eq!(reopened.load_token().as_deref(), Some("tok-1"));
        assert_eq!(reopened.load_user().expect("user")["id"], "u1");

        reopened.clear().expect("clear");
        assert_eq!(store.load_token(), None);
        assert_eq!(store.load_user(), None);
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("credentials.json"), b"{not json").expect("write");

        let store = FileCredentialStore::new(dir.path());
        assert_eq!(store.load_token(), None);
        assert_eq!(store.load_user(), None);
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileCredentialStore::new(dir.path());
        store.clear().expect("clear on empty store");
        store.store_token("tok").expect("store");
        store.clear().expect("clear");
        store.clear().expect("second clear");
    }
}
