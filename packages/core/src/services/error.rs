//! Service Layer Error Types
//!
//! Two families of failures exist in the annotation layer:
//!
//! - [`TreeError`] - structural validation failures raised by the neurite
//!   editor. The annotation model handles these locally: it logs a warning
//!   and turns the operation into a no-op.
//! - [`AnnotationError`] - what callers of the annotation model see:
//!   persistence failures, missing state, import/export problems.

use crate::db::StoreError;
use crate::models::{AnnotationId, NeuronId};
use thiserror::Error;

/// Structural validation failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreeError {
    /// Annotation does not exist (possibly deleted by another view)
    #[error("Annotation not found: {id}")]
    AnnotationNotFound { id: AnnotationId },

    /// Neuron does not exist
    #[error("Neuron not found: {id}")]
    NeuronNotFound { id: NeuronId },

    /// Link deletion has no unambiguous reparent target
    #[error("Cannot delete link {id}: {reason}")]
    AmbiguousDelete { id: AnnotationId, reason: String },

    /// Split direction cannot be determined
    #[error("Cannot split annotation {id}: {reason}")]
    AmbiguousSplit { id: AnnotationId, reason: String },

    /// Operation requires a non-root annotation
    #[error("Annotation {id} is already a root")]
    AlreadyRoot { id: AnnotationId },

    /// Anchored path endpoints are not parent and child
    #[error("Annotations {first} and {second} are not adjacent")]
    NotAdjacent {
        first: AnnotationId,
        second: AnnotationId,
    },

    /// Traced path does not start and end at the live anchor locations
    #[error("Path endpoints do not match annotations {first} and {second}")]
    EndpointMismatch {
        first: AnnotationId,
        second: AnnotationId,
    },

    /// Operation would make an annotation its own ancestor
    #[error("Circular reference detected: {context}")]
    CircularReference { context: String },

    /// Invalid argument to a structural operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl TreeError {
    pub fn annotation_not_found(id: AnnotationId) -> Self {
        Self::AnnotationNotFound { id }
    }

    pub fn neuron_not_found(id: NeuronId) -> Self {
        Self::NeuronNotFound { id }
    }

    pub fn ambiguous_delete(id: AnnotationId, reason: impl Into<String>) -> Self {
        Self::AmbiguousDelete {
            id,
            reason: reason.into(),
        }
    }

    pub fn ambiguous_split(id: AnnotationId, reason: impl Into<String>) -> Self {
        Self::AmbiguousSplit {
            id,
            reason: reason.into(),
        }
    }

    pub fn circular_reference(context: impl Into<String>) -> Self {
        Self::CircularReference {
            context: context.into(),
        }
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }
}

/// Annotation model errors
#[derive(Error, Debug)]
pub enum AnnotationError {
    /// Remote store call failed; in-memory state was left unchanged
    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("No sample loaded")]
    NoSampleLoaded,

    #[error("No workspace loaded")]
    NoWorkspaceLoaded,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// SWC file could not be parsed or is inconsistent
    #[error("Invalid SWC data: {0}")]
    Swc(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Long-running import or export was cancelled between units of work
    #[error("Operation cancelled")]
    Cancelled,

    /// The model's executor task has stopped
    #[error("Annotation model is closed")]
    ModelClosed,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AnnotationError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn swc(msg: impl Into<String>) -> Self {
        Self::Swc(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result alias for annotation model calls
pub type AnnotationResult<T> = Result<T, AnnotationError>;
