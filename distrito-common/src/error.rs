//! Common error types for Distrito

use thiserror::Error;

/// Common result type for Distrito operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced by the attendance engine and its store adapters
#[derive(Error, Debug)]
pub enum Error {
    /// Date text that matched neither the day-first nor the ISO formats
    #[error("Unrecognized date: {0:?}")]
    DateParse(String),

    /// Attempt to create a cell whose leader already exists
    #[error("Leader already exists: {0}")]
    DuplicateLeader(String),

    /// Mutation addressed to a cell that does not exist
    #[error("Unknown leader: {0}")]
    UnknownLeader(String),

    /// Invalid submission, roster edit or ledger slice
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Remote store rejected a read or a write
    #[error("Store error: {0}")]
    Store(String),

    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Table (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
