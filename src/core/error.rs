//! Error types shared by the session and the API clients

use thiserror::Error;

/// Failure talking to the event backend
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// The secure token is unknown or expired
    #[error("Invalid or expired token: {0}")]
    InvalidToken(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Server error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Failed to decode response: {0}")]
    Decode(String),
    /// Well-formed answer with `success: false`
    #[error("Request rejected: {0}")]
    Rejected(String),
}

impl ApiError {
    /// Transient errors are retried on the next cycle
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_) | ApiError::Http { status: 408 | 429 | 500.., .. }
        )
    }
}

/// Failure of a participant-facing session operation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// Too many failed token attempts; rejected before any network call
    #[error("Too many attempts, try again in {retry_after_secs}s")]
    Locked { retry_after_secs: u64 },
    /// Input rejected locally (shown as a toast, nothing mutated)
    #[error("{0}")]
    Validation(String),
    #[error("No participant session")]
    NoSession,
    #[error(transparent)]
    Api(#[from] ApiError),
}
