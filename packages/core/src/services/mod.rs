//! Annotation Services
//!
//! This module contains the annotation layer's business logic:
//!
//! - `AnnotationModel` - Orchestrates every edit: validate, edit, persist, notify
//! - `ModelExecutor` / `AnnotationModelHandle` - Single-writer task serializing model access
//! - `NeuriteEditor` - Pure structural edits on one neuron's annotation forest
//! - `NeuronTagMap` - Bidirectional neuron <-> tag index
//! - `EventNotifier` - Listener and broadcast delivery of model events
//!
//! Services coordinate between the domain store and view layers, keeping the
//! in-memory neurons identical to what was last persisted.

pub mod annotation_model;
pub mod error;
pub mod model_actor;
pub mod notifier;
pub mod tag_map;
pub mod tree_manipulator;

pub use annotation_model::{AnnotationModel, ModelState};
pub use error::{AnnotationError, AnnotationResult, TreeError};
pub use model_actor::{AnnotationModelHandle, ModelExecutor, ModelFuture};
pub use notifier::{
    AnnotationListener, EventNotifier, InlineDispatcher, ListenerId, QueuedDispatcher,
    UiDispatcher, UiQueue,
};
pub use tag_map::NeuronTagMap;
pub use tree_manipulator::{transplant_neurite, AnnotationIdAllocator, NeuriteEditor, TreeChanges};
