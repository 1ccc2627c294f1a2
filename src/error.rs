//! Error types for health checks and cleanup.
//!
//! Defines the crate error with classification for retry behavior, and the
//! aggregate error returned when several cleanup stages fail.

use std::fmt;

use thiserror::Error;

/// Error type for care and cleanup operations
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Missing required field in resource
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Validation error in configuration or resource spec
    #[error("Validation error: {0}")]
    Validation(String),

    /// Label or field selector could not be built
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    /// Annotation on the shoot carries a value that cannot be used
    #[error("Invalid value {value:?} for annotation {key}: {reason}")]
    InvalidAnnotation {
        key: String,
        value: String,
        reason: String,
    },

    /// Object does not exist (anymore)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write lost a race against a concurrent update
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Objects matched by a cleanup stage still exist
    #[error("{} {kind} object(s) still remaining: {}", .names.len(), .names.join(", "))]
    ObjectsRemaining { kind: String, names: Vec<String> },

    /// Deadline exceeded while waiting for an operation
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Transient error that should be retried
    #[error("Transient error: {0}")]
    Transient(String),

    /// Permanent error that should not be retried
    #[error("Permanent error: {0}")]
    Permanent(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Tunnel between control plane and shoot is broken
    #[error("Tunnel probe failed: {0}")]
    Tunnel(#[from] crate::care::tunnel::TunnelError),
}

impl Error {
    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Kube(kube::Error::Api(e)) => e.code == 404,
            Error::NotFound(_) => true,
            _ => false,
        }
    }

    /// Check if this error is an HTTP 409 conflict
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Kube(kube::Error::Api(e)) => e.code == 409,
            Error::Conflict(_) => true,
            _ => false,
        }
    }

    /// Check if this error only reports objects that are still being deleted
    pub fn is_objects_remaining(&self) -> bool {
        matches!(self, Error::ObjectsRemaining { .. })
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(e) => {
                // Retry on network errors, rate limiting, conflicts and server errors
                matches!(
                    e,
                    kube::Error::Api(api_err)
                        if api_err.code >= 500 || api_err.code == 429 || api_err.code == 409
                ) || matches!(e, kube::Error::Service(_))
            }
            Error::Transient(_)
            | Error::Conflict(_)
            | Error::ObjectsRemaining { .. }
            | Error::Timeout(_)
            | Error::Tunnel(_) => true,
            Error::Validation(_)
            | Error::Permanent(_)
            | Error::MissingField(_)
            | Error::NotFound(_)
            | Error::InvalidSelector(_)
            | Error::InvalidAnnotation { .. } => false,
            Error::Serialization(_) => false,
        }
    }
}

/// Result type alias for care and cleanup operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single cleanup stage, attributed to the kind it cleans.
#[derive(Debug)]
pub struct StageError {
    /// Resource kind handled by the failing stage
    pub kind: String,
    /// Error returned by the stage
    pub error: Error,
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.error)
    }
}

/// Every failing stage of a concurrent cleanup run.
#[derive(Debug)]
pub struct CleanupErrors(pub Vec<StageError>);

impl std::error::Error for CleanupErrors {}

impl CleanupErrors {
    /// Kinds whose stage failed, in stage declaration order
    pub fn kinds(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.kind.as_str()).collect()
    }

    /// Whether every failing stage only has objects left over
    pub fn only_objects_remaining(&self) -> bool {
        self.0.iter().all(|e| e.error.is_objects_remaining())
    }
}

impl fmt::Display for CleanupErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} cleanup stage(s) failed", self.0.len())?;
        for (i, stage) in self.0.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{stage}")?;
        }
        Ok(())
    }
}
