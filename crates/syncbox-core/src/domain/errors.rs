//! Domain error types
//!
//! This module defines error types raised while building or reading domain
//! values: malformed arguments, missing collaborators, and reads of empty
//! result slots. None of these are retried; they indicate a defect in the
//! calling code and are propagated immediately.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid content hash (MD5 must be exactly 16 bytes)
    #[error("Invalid hash format: {0}")]
    InvalidHash(String),

    /// A value was read from an empty (never filled) result slot
    #[error("Cannot retrieve property values on an invalid {type_name}")]
    InvalidState {
        /// Short name of the type held by the slot
        type_name: &'static str,
    },

    /// A required collaborator was not supplied at construction time
    #[error("Missing required collaborator: {0}")]
    MissingCollaborator(&'static str),

    /// Invalid server event identifier
    #[error("Invalid event id: {0}")]
    InvalidEventId(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}
