//! Data Models
//!
//! This module contains the data structures shared by the annotation layer:
//!
//! - `Neuron` - arena of annotation nodes with anchored paths and notes
//! - `GeoAnnotation` - one traced point, related to others by id
//! - `Sample` / `Workspace` - the imaged volume and the tracing session on it
//! - `NeuronStyle` - color and visibility
//!
//! Relations between objects are always ids; nothing embeds a reference to
//! another model object.

mod anchored_path;
mod annotation;
mod geometry;
mod neuron;
mod note;
mod style;
mod workspace;

pub use anchored_path::{AnchoredPath, AnchoredPathEndpoints};
pub use annotation::{AnnotationId, GeoAnnotation, NeuronId, SampleId, WorkspaceId};
pub use geometry::{ParametrizedLine, Vec3};
pub use neuron::Neuron;
pub use note::{PredefinedNote, StructuredTextAnnotation, NOTE_KEY};
pub use style::{BulkNeuronStyleUpdate, Color, NeuronStyle};
pub use workspace::{transform_point, Matrix4, Sample, Workspace, IDENTITY};
