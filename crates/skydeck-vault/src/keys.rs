//! Storage key constants.

/// Storage keys used by the token vault
pub struct StorageKeys;

impl StorageKeys {
    /// Access token (short-lived bearer credential)
    pub const ACCESS_TOKEN: &'static str = "access_token";

    /// Refresh token (exchanged for new token pairs)
    pub const REFRESH_TOKEN: &'static str = "refresh_token";
}
