//! Error types for cachewire
//!
//! Provides a unified error type for client, codec and server operations.

use thiserror::Error;

/// Result type alias using ClientError
pub type Result<T> = std::result::Result<T, ClientError>;

/// Unified error type for cachewire operations
#[derive(Debug, Error)]
pub enum ClientError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Connection Errors
    // -------------------------------------------------------------------------
    /// Handshake or transport failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// The request was cancelled because the connection closed
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Request timed out: {0}")]
    Timeout(String),

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    // -------------------------------------------------------------------------
    // Object Model Errors
    // -------------------------------------------------------------------------
    /// A binary object does not fit the requested schema
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Operation issued before the required configuration was in place
    #[error("Invalid state: {0}")]
    InvalidState(String),

    // -------------------------------------------------------------------------
    // Cache Errors
    // -------------------------------------------------------------------------
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Cache does not exist: {0}")]
    CacheNotFound(String),

    #[error("Cache already exists: {0}")]
    CacheExists(String),

    /// Any other failure reported by the server
    #[error("Server error (status {status}): {message}")]
    Server { status: i32, message: String },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    pub(crate) fn type_mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        ClientError::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// True when the error means the key (not the cache) was missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

impl From<bincode::Error> for ClientError {
    fn from(err: bincode::Error) -> Self {
        ClientError::Decode(format!("binary type metadata: {}", err))
    }
}
