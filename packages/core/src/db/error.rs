//! Domain Store Error Types
//!
//! This module defines error types for calls into the remote domain store.
//! Every store call is treated as fallible; callers never assume success.

use thiserror::Error;

/// Remote domain store errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Requested object does not exist in the store
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Store could not be reached
    #[error("Domain store unavailable: {0}")]
    Unavailable(String),

    /// Store refused the write
    #[error("Save rejected: {0}")]
    Rejected(String),

    /// Concurrent modification detected by the store
    #[error("Conflicting update: {0}")]
    Conflict(String),
}

impl StoreError {
    /// Create a not found error
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Create an unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create a rejected error
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

/// Result alias for store calls
pub type StoreResult<T> = Result<T, StoreError>;
