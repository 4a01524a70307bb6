//! Error taxonomy for ingestion and analytics

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::store::StoreError;

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// A field value whose representation cannot be coerced to the wanted number
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot coerce field '{field}' from {found}")]
pub struct CoercionError {
    pub field: String,
    pub found: String,
}

impl CoercionError {
    pub fn new(field: impl Into<String>, found: impl fmt::Display) -> Self {
        Self {
            field: field.into(),
            found: found.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Collection name has no record schema
    #[error("unknown collection '{collection}': no record schema")]
    Schema { collection: String },

    #[error(transparent)]
    Coercion(#[from] CoercionError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Transient store failure that outlived every retry
    #[error("{operation} on '{collection}' failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: &'static str,
        collection: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    /// First failure observed by a fan-out phase; sibling results were discarded
    #[error("{phase} failed: {source}")]
    Aggregate {
        phase: String,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn config<E: fmt::Display>(msg: E) -> Self {
        Self::Config(msg.to_string())
    }

    pub fn aggregate(phase: impl Into<String>, source: PipelineError) -> Self {
        Self::Aggregate {
            phase: phase.into(),
            source: Box::new(source),
        }
    }

    /// Whether the underlying store failure was a deadline
    pub fn timed_out(&self) -> Option<Duration> {
        match self {
            Self::Store(StoreError::Timeout(d))
            | Self::RetriesExhausted {
                source: StoreError::Timeout(d),
                ..
            } => Some(*d),
            Self::Aggregate { source, .. } => source.timed_out(),
            _ => None,
        }
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::WorkerPanicked(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_error_names_phase_and_cause() {
        let err = PipelineError::aggregate(
            "count_all",
            PipelineError::RetriesExhausted {
                operation: "count",
                collection: "studentVle".into(),
                attempts: 3,
                source: StoreError::unavailable("node down"),
            },
        );
        let msg = err.to_string();
        assert!(msg.starts_with("count_all failed"));
        assert!(msg.contains("studentVle"));
        assert!(msg.contains("3 attempts"));
    }

    #[test]
    fn test_timed_out_sees_through_wrappers() {
        let err = PipelineError::aggregate(
            "average_by_assessment_type",
            PipelineError::Store(StoreError::Timeout(Duration::from_secs(600))),
        );
        assert_eq!(err.timed_out(), Some(Duration::from_secs(600)));
        assert_eq!(PipelineError::config("x").timed_out(), None);
    }

    #[test]
    fn test_coercion_error_message() {
        let err = CoercionError::new("score", "array");
        assert_eq!(err.to_string(), "cannot coerce field 'score' from array");
    }
}
