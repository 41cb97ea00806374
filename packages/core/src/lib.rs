//! LVV Core Annotation Layer
//!
//! This crate provides the annotation data model, neurite tree editing, and
//! change notification for the Large Volume Viewer's neuron tracing workflow.
//!
//! # Architecture
//!
//! - **Working-copy edits**: Every structural change runs on a clone of the
//!   neuron and is committed only after the domain store accepted it
//! - **Single writer**: One executor task owns the model; callers queue jobs
//!   through a cloneable handle
//! - **Ordered notification**: Data-changed events are published before
//!   selection events, to listeners through a UI dispatcher and to async
//!   consumers through a broadcast channel
//! - **Pluggable persistence**: The remote domain store sits behind the
//!   [`DomainStore`] trait; [`InMemoryStore`] backs tests and tools
//!
//! # Modules
//!
//! - [`models`] - Data structures (Neuron, GeoAnnotation, AnchoredPath, etc.)
//! - [`services`] - Annotation model, tree editor, tag map, notifier
//! - [`db`] - Domain store trait, in-memory store, and event types
//! - [`config`] - Model configuration
//! - [`utils`] - SWC files and progress reporting

pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::ModelConfig;
pub use db::{AnnotationEvent, DomainStore, InMemoryStore, StoreError, StoreResult};
pub use models::*;
pub use services::*;
