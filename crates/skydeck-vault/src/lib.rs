//! Credential storage for the Skydeck client toolkit.
//!
//! This crate provides:
//! - A `SecureStorage` trait for pluggable backends
//! - A file-backed implementation for headless environments
//! - The `TokenVault` high-level API over the persisted token pair

mod file;
mod keys;
mod traits;
mod vault;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use traits::SecureStorage;
pub use vault::{TokenPair, TokenVault};

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create a TokenVault backed by the credentials file at the given path.
pub fn open_vault(path: impl Into<std::path::PathBuf>) -> StorageResult<TokenVault> {
    let storage = FileStorage::open(path)?;
    Ok(TokenVault::new(Box::new(storage)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_vault_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let vault = open_vault(&path).unwrap();
        vault.set_tokens("a1", "r1").unwrap();

        // A fresh vault over the same file sees the persisted pair
        let reopened = open_vault(&path).unwrap();
        assert!(reopened.has_valid_tokens().unwrap());
        assert_eq!(
            reopened.access_token().unwrap(),
            Some("a1".to_string())
        );
    }

    #[test]
    fn test_storage_keys_are_fixed_names() {
        assert_eq!(StorageKeys::ACCESS_TOKEN, "access_token");
        assert_eq!(StorageKeys::REFRESH_TOKEN, "refresh_token");
    }
}
