//! Error types for flow-core

use thiserror::Error;

/// Result type alias using flow-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in flow-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote document store rejected the request
    #[error("Remote store error: {0}")]
    Remote(String),

    /// Blob storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
