//! Domain error types
//!
//! Errors raised while constructing or validating domain values such as
//! relative paths and persisted transfer states.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid relative path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Unrecognized persisted status value
    #[error("Unknown sync status: {0}")]
    UnknownStatus(String),

    /// A persisted state is missing data its status requires
    #[error("Incomplete state for {path}: {reason}")]
    IncompleteState {
        /// Path the state is keyed by
        path: String,
        /// What is missing
        reason: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidPath("/bad/path".to_string());
        assert_eq!(err.to_string(), "Invalid path: /bad/path");

        let err = DomainError::UnknownStatus("paused".to_string());
        assert_eq!(err.to_string(), "Unknown sync status: paused");

        let err = DomainError::IncompleteState {
            path: "a.txt".to_string(),
            reason: "no temp file".to_string(),
        };
        assert_eq!(err.to_string(), "Incomplete state for a.txt: no temp file");
    }

    #[test]
    fn test_error_equality() {
        let err1 = DomainError::InvalidPath("/path".to_string());
        let err2 = DomainError::InvalidPath("/path".to_string());
        let err3 = DomainError::InvalidPath("/other".to_string());

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
