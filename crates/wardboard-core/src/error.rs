//! Error types for wardboard-core

use thiserror::Error;

/// Result type alias using wardboard-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in wardboard-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// A submitted form is incomplete (missing reason, time, or detail);
    /// surfaced before any commit is attempted
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Fetching existing state from the store failed; retryable
    #[error("Read failed: {0}")]
    Read(String),

    /// The atomic supersession transaction was rejected; fully rolled back
    #[error("Commit failed: {0}")]
    Commit(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Patient not found
    #[error("Patient not found: {0}")]
    PatientNotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
