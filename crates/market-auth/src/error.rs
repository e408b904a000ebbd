//! Authentication error types.

use reqwest::StatusCode;
use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Login rejected (bad email or password)
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Registration rejected because the account already exists
    #[error("Account already exists: {0}")]
    AccountExists(String),

    /// Renewal failed or was impossible; credentials have been cleared
    #[error("Session expired")]
    SessionExpired,

    /// The actor has no role profile yet (onboarding not finished)
    #[error("Profile not found")]
    ProfileNotFound,

    /// Transport failure or timeout
    #[error("Network error: {0}")]
    Network(String),

    /// Persistence layer failure
    #[error("Storage error: {0}")]
    Storage(#[from] market_storage::StorageError),

    /// Server answered with an unexpected status
    #[error("HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },

    /// Server payload did not match any known shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Invalid state transition in the phase FSM
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    /// The session was signed out while the action was in flight
    #[error("Session ended before the action completed")]
    Superseded,
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AuthError::Network(format!("request timed out: {err}"))
        } else if err.is_decode() {
            AuthError::InvalidResponse(err.to_string())
        } else {
            AuthError::Network(err.to_string())
        }
    }
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include network failures, timeouts and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Network(_) => true,
            AuthError::Http { status, .. } => status.is_server_error(),
            _ => false,
        }
    }

    /// Returns true if the session is gone and the user must sign in again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AuthError::SessionExpired)
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
