//! Shared credential record set.
//!
//! A flat JSON file mapping username -> bcrypt hash, shared across all
//! users. Passwords are never stored or logged in plaintext.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::info;

use parley_core::error::ParleyError;

/// Username -> salted-hash credential store backed by one JSON file.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Whether an account exists for `username`.
    pub fn contains(&self, username: &str) -> Result<bool, ParleyError> {
        Ok(self.load()?.contains_key(username))
    }

    /// Create an account with a freshly salted hash.
    ///
    /// Fails if the username is already taken.
    pub fn register(&self, username: &str, password: &str) -> Result<(), ParleyError> {
        let mut records = self.load()?;
        if records.contains_key(username) {
            return Err(ParleyError::Credentials(format!(
                "Username already taken: {}",
                username
            )));
        }

        let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|e| ParleyError::Credentials(format!("Failed to hash password: {}", e)))?;
        records.insert(username.to_string(), hash);
        self.save(&records)?;

        info!(user = %username, "Account created");
        Ok(())
    }

    /// Check a password against the stored hash.
    ///
    /// An unknown username verifies as false rather than erroring, so the
    /// caller decides whether to offer account creation.
    pub fn verify(&self, username: &str, password: &str) -> Result<bool, ParleyError> {
        let records = self.load()?;
        match records.get(username) {
            Some(hash) => bcrypt::verify(password, hash)
                .map_err(|e| ParleyError::Credentials(format!("Failed to verify password: {}", e))),
            None => Ok(false),
        }
    }

    fn load(&self) -> Result<BTreeMap<String, String>, ParleyError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let records = serde_json::from_str(&content)?;
        Ok(records)
    }

    fn save(&self, records: &BTreeMap<String, String>) -> Result<(), ParleyError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(records)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, CredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        (dir, store)
    }

    #[test]
    fn test_register_then_verify() {
        let (_dir, store) = store();
        store.register("alice", "hunter2").unwrap();
        assert!(store.verify("alice", "hunter2").unwrap());
        assert!(!store.verify("alice", "wrong").unwrap());
    }

    #[test]
    fn test_unknown_user_verifies_false() {
        let (_dir, store) = store();
        assert!(!store.verify("nobody", "anything").unwrap());
    }

    #[test]
    fn test_contains() {
        let (_dir, store) = store();
        assert!(!store.contains("alice").unwrap());
        store.register("alice", "hunter2").unwrap();
        assert!(store.contains("alice").unwrap());
    }

    #[test]
    fn test_register_duplicate_username_fails() {
        let (_dir, store) = store();
        store.register("alice", "hunter2").unwrap();
        let err = store.register("alice", "other").unwrap_err();
        assert!(matches!(err, ParleyError::Credentials(_)));
        // Original password still verifies.
        assert!(store.verify("alice", "hunter2").unwrap());
    }

    #[test]
    fn test_plaintext_never_persisted() {
        let (dir, store) = store();
        store.register("alice", "hunter2").unwrap();

        let on_disk = std::fs::read_to_string(dir.path().join("credentials.json")).unwrap();
        assert!(!on_disk.contains("hunter2"));
        assert!(on_disk.contains("alice"));
    }

    #[test]
    fn test_multiple_accounts_round_trip() {
        let (_dir, store) = store();
        store.register("alice", "pw-a").unwrap();
        store.register("bob", "pw-b").unwrap();

        assert!(store.verify("alice", "pw-a").unwrap());
        assert!(store.verify("bob", "pw-b").unwrap());
        assert!(!store.verify("alice", "pw-b").unwrap());
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let (_dir, store) = store();
        assert!(!store.contains("anyone").unwrap());
    }
}
