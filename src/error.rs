//! Error types for the news store.
//!
//! Every failure carries a distinct [`ErrorKind`] so callers (and the
//! `newsctl` binary) can tell authentication, project, database, and
//! permission problems apart instead of reading a generic message.

use thiserror::Error;

/// Classification of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    StoreUnavailable,
    Configuration,
    Authentication,
    PermissionDenied,
    ProjectNotFound,
    DatabaseNotFound,
    RequestRejected,
    MalformedRecord,
}

impl ErrorKind {
    /// Whether retrying the same call later may succeed.
    ///
    /// The store itself never retries; this is a hint for callers.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::StoreUnavailable)
    }
}

/// Errors returned by the news store and its backends.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    /// The backend refused a well-formed call (bad argument, failed
    /// precondition such as a missing index).
    #[error("request rejected by backend: {0}")]
    RequestRejected(String),

    #[error("malformed record '{key}': {reason}")]
    MalformedRecord { key: String, reason: String },
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidInput(_) => ErrorKind::InvalidInput,
            StoreError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            StoreError::Configuration(_) => ErrorKind::Configuration,
            StoreError::Authentication(_) => ErrorKind::Authentication,
            StoreError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            StoreError::ProjectNotFound(_) => ErrorKind::ProjectNotFound,
            StoreError::DatabaseNotFound(_) => ErrorKind::DatabaseNotFound,
            StoreError::RequestRejected(_) => ErrorKind::RequestRejected,
            StoreError::MalformedRecord { .. } => ErrorKind::MalformedRecord,
        }
    }

    pub(crate) fn malformed(key: &str, reason: impl Into<String>) -> Self {
        StoreError::MalformedRecord {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::StoreUnavailable(format!("sqlite: {}", err))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::StoreUnavailable(format!("http: {}", err))
    }
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
