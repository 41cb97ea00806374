//! Annotation Events
//!
//! This module defines the change notifications published by the annotation
//! model. The view layer subscribes to them instead of registering one
//! listener interface per kind of change.
//!
//! # Architecture
//!
//! Events are a single tagged enum published through one path (see
//! `services::notifier`), so the relative order of events from one operation
//! is the order in which they were published.
//!
//! # Ordering
//!
//! For a given operation, data-changed events (annotations, paths, notes,
//! styles, tags) are always published before selection or reload events
//! (`NeuronSelected`, `WorkspaceLoaded`). A listener redrawing on selection
//! therefore always sees the updated tree.

use crate::models::{
    AnchoredPath, AnnotationId, GeoAnnotation, NeuronId, NeuronStyle, Vec3, WorkspaceId,
};
use serde::{Deserialize, Serialize};

/// Change notifications emitted by the annotation model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AnnotationEvent {
    /// A workspace finished loading (`None` after a sample load clears it)
    #[serde(rename_all = "camelCase")]
    WorkspaceLoaded { workspace_id: Option<WorkspaceId> },

    /// Model was cleared
    WorkspaceUnloaded,

    /// Current neuron changed (`None` means nothing selected)
    #[serde(rename_all = "camelCase")]
    NeuronSelected { neuron_id: Option<NeuronId> },

    #[serde(rename_all = "camelCase")]
    NeuronCreated { neuron_id: NeuronId, name: String },

    #[serde(rename_all = "camelCase")]
    NeuronRenamed { neuron_id: NeuronId, name: String },

    #[serde(rename_all = "camelCase")]
    NeuronDeleted { neuron_id: NeuronId },

    #[serde(rename_all = "camelCase")]
    NeuronStyleChanged {
        neuron_id: NeuronId,
        style: NeuronStyle,
    },

    /// Bulk style change
    NeuronStylesChanged { styles: Vec<(NeuronId, NeuronStyle)> },

    #[serde(rename_all = "camelCase")]
    NeuronTagsChanged { neuron_ids: Vec<NeuronId> },

    AnnotationAdded { annotation: GeoAnnotation },

    AnnotationMoved { annotation: GeoAnnotation },

    /// A move could not be persisted; the view should put the anchor back
    #[serde(rename_all = "camelCase")]
    AnnotationNotMoved {
        annotation: GeoAnnotation,
        attempted_location: Vec3,
    },

    AnnotationRadiusUpdated { annotation: GeoAnnotation },

    /// Parent (and possibly neuron) of an annotation changed
    #[serde(rename_all = "camelCase")]
    AnnotationReparented {
        annotation: GeoAnnotation,
        previous_neuron_id: NeuronId,
    },

    AnnotationsDeleted { annotations: Vec<GeoAnnotation> },

    #[serde(rename_all = "camelCase")]
    AnchoredPathAdded { neuron_id: NeuronId, path: AnchoredPath },

    #[serde(rename_all = "camelCase")]
    AnchoredPathsRemoved {
        neuron_id: NeuronId,
        paths: Vec<AnchoredPath>,
    },

    #[serde(rename_all = "camelCase")]
    NotesUpdated { workspace_id: WorkspaceId },

    /// Automated tracing should retrace the edges around an annotation
    #[serde(rename_all = "camelCase")]
    PathTraceRequested {
        neuron_id: NeuronId,
        annotation_id: AnnotationId,
    },
}

impl AnnotationEvent {
    /// Get a string representation of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            AnnotationEvent::WorkspaceLoaded { .. } => "workspace:loaded",
            AnnotationEvent::WorkspaceUnloaded => "workspace:unloaded",
            AnnotationEvent::NeuronSelected { .. } => "neuron:selected",
            AnnotationEvent::NeuronCreated { .. } => "neuron:created",
            AnnotationEvent::NeuronRenamed { .. } => "neuron:renamed",
            AnnotationEvent::NeuronDeleted { .. } => "neuron:deleted",
            AnnotationEvent::NeuronStyleChanged { .. } => "neuron:style-changed",
            AnnotationEvent::NeuronStylesChanged { .. } => "neuron:styles-changed",
            AnnotationEvent::NeuronTagsChanged { .. } => "neuron:tags-changed",
            AnnotationEvent::AnnotationAdded { .. } => "annotation:added",
            AnnotationEvent::AnnotationMoved { .. } => "annotation:moved",
            AnnotationEvent::AnnotationNotMoved { .. } => "annotation:not-moved",
            AnnotationEvent::AnnotationRadiusUpdated { .. } => "annotation:radius-updated",
            AnnotationEvent::AnnotationReparented { .. } => "annotation:reparented",
            AnnotationEvent::AnnotationsDeleted { .. } => "annotation:deleted",
            AnnotationEvent::AnchoredPathAdded { .. } => "anchored-path:added",
            AnnotationEvent::AnchoredPathsRemoved { .. } => "anchored-path:removed",
            AnnotationEvent::NotesUpdated { .. } => "notes:updated",
            AnnotationEvent::PathTraceRequested { .. } => "path:trace-requested",
        }
    }

    /// Selection and reload events, published after data events
    pub fn is_selection_event(&self) -> bool {
        matches!(
            self,
            AnnotationEvent::WorkspaceLoaded { .. }
                | AnnotationEvent::WorkspaceUnloaded
                | AnnotationEvent::NeuronSelected { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnchoredPathEndpoints, Color};

    /// Contract test: documents the exact JSON format consumed by view layers.
    ///
    /// `#[serde(tag = "type")]` produces an internally tagged format where the
    /// discriminator is merged with the variant fields.
    #[test]
    fn test_event_serialization_contract() {
        let event = AnnotationEvent::NeuronSelected {
            neuron_id: Some(NeuronId(12)),
        };
        let parsed = serde_json::to_value(&event).unwrap();
        assert_eq!(parsed["type"], "neuronSelected");
        assert_eq!(parsed["neuronId"], 12);

        let event = AnnotationEvent::AnchoredPathsRemoved {
            neuron_id: NeuronId(3),
            paths: vec![AnchoredPath::new(
                AnchoredPathEndpoints::new(AnnotationId(2), AnnotationId(1)),
                vec![[0, 0, 0]],
            )],
        };
        let parsed = serde_json::to_value(&event).unwrap();
        assert_eq!(parsed["type"], "anchoredPathsRemoved");
        assert_eq!(parsed["paths"][0]["endpoints"]["first"], 1);

        let event = AnnotationEvent::NeuronStyleChanged {
            neuron_id: NeuronId(1),
            style: NeuronStyle::new(Color::rgb(255, 0, 0), false),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: AnnotationEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_unit_variant_is_tagged() {
        let json = serde_json::to_string(&AnnotationEvent::WorkspaceUnloaded).unwrap();
        assert_eq!(json, r#"{"type":"workspaceUnloaded"}"#);
    }

    #[test]
    fn test_selection_classification() {
        assert!(AnnotationEvent::NeuronSelected { neuron_id: None }.is_selection_event());
        assert!(!AnnotationEvent::NotesUpdated {
            workspace_id: WorkspaceId(1)
        }
        .is_selection_event());
        assert_eq!(
            AnnotationEvent::NeuronTagsChanged { neuron_ids: vec![] }.event_type(),
            "neuron:tags-changed"
        );
    }
}
