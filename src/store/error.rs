//! Error types for the document store layer

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store error types
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Document could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Store is temporarily unable to serve the request
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Connection to the store failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Call exceeded its deadline
    #[error("Timeout: operation took longer than {0:?}")]
    Timeout(Duration),

    /// Collection or item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflicting definition (e.g. an index name reused with other keys)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Aggregation pipeline cannot be evaluated
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),
}

impl StoreError {
    /// Create a serialization error
    pub fn serialization<E: fmt::Display>(err: E) -> Self {
        Self::Serialization(err.to_string())
    }

    /// Create an unavailable error
    pub fn unavailable<E: fmt::Display>(msg: E) -> Self {
        Self::Unavailable(msg.to_string())
    }

    /// Create a connection error
    pub fn connection<E: fmt::Display>(msg: E) -> Self {
        Self::Connection(msg.to_string())
    }

    /// Create a not found error
    pub fn not_found<E: fmt::Display>(item: E) -> Self {
        Self::NotFound(item.to_string())
    }

    /// Create a conflict error
    pub fn conflict<E: fmt::Display>(msg: E) -> Self {
        Self::Conflict(msg.to_string())
    }

    /// Create an invalid pipeline error
    pub fn invalid_pipeline<E: fmt::Display>(msg: E) -> Self {
        Self::InvalidPipeline(msg.to_string())
    }

    /// Check if this is a transient error worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Unavailable(_) | Self::Connection(_) | Self::Timeout(_)
        )
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err)
    }
}
