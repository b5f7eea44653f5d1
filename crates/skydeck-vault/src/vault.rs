//! High-level API for the persisted token pair.

use crate::{SecureStorage, StorageKeys, StorageResult};

/// A persisted access/refresh token pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    /// Short-lived bearer credential attached to protected API calls.
    pub access_token: String,
    /// Longer-lived credential exchanged for a new access token.
    pub refresh_token: String,
}

/// High-level API over a storage backend for the session's token pair.
///
/// The vault persists exactly two values, keyed `access_token` and
/// `refresh_token`. It is a passive store: session-state bookkeeping
/// (expiry, current user, refresh scheduling) lives in the session layer.
pub struct TokenVault {
    storage: Box<dyn SecureStorage>,
}

impl TokenVault {
    /// Create a new vault with the given storage backend.
    pub fn new(storage: Box<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    /// Persist both tokens.
    pub fn set_tokens(&self, access_token: &str, refresh_token: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::ACCESS_TOKEN, access_token)?;
        self.storage.set(StorageKeys::REFRESH_TOKEN, refresh_token)?;
        tracing::debug!("Token pair stored");
        Ok(())
    }

    /// Retrieve the access token.
    pub fn access_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::ACCESS_TOKEN)
    }

    /// Retrieve the refresh token.
    pub fn refresh_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::REFRESH_TOKEN)
    }

    /// Retrieve the full token pair, if both values are present.
    pub fn token_pair(&self) -> StorageResult<Option<TokenPair>> {
        let access_token = self.storage.get(StorageKeys::ACCESS_TOKEN)?;
        let refresh_token = self.storage.get(StorageKeys::REFRESH_TOKEN)?;
        Ok(match (access_token, refresh_token) {
            (Some(access_token), Some(refresh_token)) => Some(TokenPair {
                access_token,
                refresh_token,
            }),
            _ => None,
        })
    }

    /// True iff both tokens are present.
    pub fn has_valid_tokens(&self) -> StorageResult<bool> {
        let has_access = self.storage.has(StorageKeys::ACCESS_TOKEN)?;
        let has_refresh = self.storage.has(StorageKeys::REFRESH_TOKEN)?;
        Ok(has_access && has_refresh)
    }

    /// Remove both tokens.
    pub fn clear_tokens(&self) -> StorageResult<()> {
        let _ = self.storage.delete(StorageKeys::ACCESS_TOKEN);
        let _ = self.storage.delete(StorageKeys::REFRESH_TOKEN);
        tracing::debug!("Token pair cleared");
        Ok(())
    }
}
