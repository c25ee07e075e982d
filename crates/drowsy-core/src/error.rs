//! Error types for drowsy-core

use thiserror::Error;

/// Result type alias using drowsy-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in drowsy-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// A record with the same local identity already exists
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
