//! Error types for adjudicator.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! the specific condition: bad input, a strategy that could not produce a
//! value, or a storage failure.

use std::path::PathBuf;

use thiserror::Error;

/// Validation errors raised before any state is touched.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ValidationError {
    #[error("Conflict context has no candidate values")]
    EmptyCandidateSet,

    #[error("Confidence value {value} is out of range [0.0, 1.0]")]
    ConfidenceOutOfRange {
        value: f64,
    },

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Invalid correction: {field} {reason}")]
    InvalidCorrection {
        field: String,
        reason: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

impl ValidationError {
    /// Shorthand for an `InvalidCorrection` on a required field.
    pub(crate) fn required(field: &str) -> Self {
        Self::InvalidCorrection {
            field: field.to_string(),
            reason: "is required".to_string(),
        }
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Errors produced while a strategy computes an outcome.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ResolutionError {
    #[error("No candidate could be parsed as a number ({candidates} candidates)")]
    NoValidNumericValues {
        candidates: usize,
    },

    #[error("Total confidence weight is zero across {candidates} numeric candidates")]
    ZeroConfidenceWeight {
        candidates: usize,
    },

    #[error("Weighted average of {candidates} numeric candidates is not a finite number")]
    NonFiniteAverage {
        candidates: usize,
    },

    #[error("Resolution record not found: {id}")]
    RecordNotFound {
        id: String,
    },
}

/// Storage errors for history, audit and learning-state files.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum StorageError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Poisoned lock: {0}")]
    LockPoisoned(&'static str),

    #[error("Failed to spawn maintenance worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Top-level error type.
#[derive(Debug, Error)]
pub enum AdjudicatorError {
    /// Bad input.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A strategy could not produce a value.
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// Persistence or locking failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl AdjudicatorError {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a resolution error.
    #[must_use]
    pub const fn is_resolution(&self) -> bool {
        matches!(self, Self::Resolution(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if repeating the call could succeed.
    ///
    /// Only I/O failures qualify: the same input always fails validation or
    /// numeric resolution the same way.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(StorageError::Io { .. }))
    }
}

/// Result type alias for adjudicator operations.
pub type AdjudicatorResult<T> = Result<T, AdjudicatorError>;
