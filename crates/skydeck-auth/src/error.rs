//! Authentication error types.

use serde::Deserialize;
use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Invalid email or password
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Authentication failure on a protected call (HTTP 401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Any other non-success HTTP response, surfaced verbatim
    #[error("API error (HTTP {status}): {detail}")]
    Api { status: u16, detail: String },

    /// Token refresh rejected by the server
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// Refresh retries exhausted
    #[error("Token refresh failed after {0} attempts")]
    RefreshExhausted(u32),

    /// Session not found
    #[error("Not signed in")]
    NotSignedIn,

    /// Invalid state transition in the session FSM
    #[error("Invalid session state transition: {0}")]
    InvalidStateTransition(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] skydeck_vault::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Build an error from a non-success HTTP response body.
    ///
    /// The server reports errors either as a flat array of strings or as a
    /// single message (bare string or `{"message": ...}` object); anything
    /// else is surfaced as the raw body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let detail = decode_error_detail(body);
        if status == 401 {
            AuthError::Unauthorized(detail)
        } else {
            AuthError::Api { status, detail }
        }
    }

    /// Returns true if this error came from a 401 response.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AuthError::Unauthorized(_))
    }

    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include:
    /// - Connection failures and timeouts
    /// - HTTP errors with 5xx status codes
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Timeout => true,
            AuthError::Api { status, .. } => (500..600).contains(status),
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

/// Error payload shapes observed from the API.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Messages(Vec<String>),
    Message(String),
    Object { message: MessageField },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageField {
    One(String),
    Many(Vec<String>),
}

fn decode_error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody::Messages(messages)) => messages.join("; "),
        Ok(ErrorBody::Message(message)) => message,
        Ok(ErrorBody::Object { message }) => match message {
            MessageField::One(message) => message,
            MessageField::Many(messages) => messages.join("; "),
        },
        Err(_) => body.trim().to_string(),
    }
}
