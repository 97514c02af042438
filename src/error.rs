//! Error types for the governance record-keeper

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for governance operations
#[derive(Error, Debug)]
pub enum Error {
    /// A referenced draft or canonical entity does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Structurally invalid input or a violated uniqueness/quorum precondition
    #[error("{0}")]
    BadRequest(String),

    /// A state-consistency check against the chain oracle failed
    #[error("{0}")]
    Forbidden(String),

    /// The external oracle call failed or returned a malformed payload
    #[error("Oracle unavailable: {0}")]
    Upstream(String),

    /// A conditional write matched zero documents - a concurrent mutation won
    #[error("Concurrent modification of {0}, re-validate and retry")]
    Conflict(String),

    /// Invalid account address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Snapshot persistence errors
    #[error("Snapshot persistence failed: {0}")]
    SnapshotPersistence(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient upstream failure)
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Upstream(_))
    }

    /// Check if this error signals a lost optimistic-concurrency race
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Error::BadRequest(reason.into())
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Error::Forbidden(reason.into())
    }
}

// Conversion from reqwest errors - every transport failure is upstream trouble
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Upstream(e.to_string())
    }
}

// Conversion from serde_json errors (snapshot decode, payload decode)
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Upstream(format!("malformed payload: {}", e))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::SnapshotPersistence(e.to_string())
    }
}
