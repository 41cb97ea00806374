//! Geometric Annotation Nodes
//!
//! A [`GeoAnnotation`] is one traced point of a neurite. Nodes live in the
//! arena owned by their [`Neuron`](super::Neuron) and refer to each other by
//! id only: `parent_id` points up, `child_ids` lists the children in
//! insertion order. Both sides are kept in agreement by the neurite editor.

use super::geometry::Vec3;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(v: u64) -> Self {
                Self(v)
            }
        }
    };
}

id_type!(
    /// Identifier of a geometric annotation (node)
    AnnotationId
);
id_type!(
    /// Identifier of a neuron
    NeuronId
);
id_type!(
    /// Identifier of a workspace
    WorkspaceId
);
id_type!(
    /// Identifier of an imaged sample
    SampleId
);

/// One traced 3D point in a neurite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoAnnotation {
    pub id: AnnotationId,
    pub neuron_id: NeuronId,
    /// `None` for a root
    pub parent_id: Option<AnnotationId>,
    /// Children in insertion order
    #[serde(default)]
    pub child_ids: Vec<AnnotationId>,
    pub location: Vec3,
    pub radius: f64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl GeoAnnotation {
    /// Default radius given to freshly placed anchors
    pub const DEFAULT_RADIUS: f64 = 1.0;

    pub fn new(
        id: AnnotationId,
        neuron_id: NeuronId,
        parent_id: Option<AnnotationId>,
        location: Vec3,
        radius: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            neuron_id,
            parent_id,
            child_ids: Vec::new(),
            location,
            radius,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.child_ids.is_empty()
    }

    /// Branch point: more than one child
    pub fn is_branch(&self) -> bool {
        self.child_ids.len() > 1
    }

    /// Bumps the modification timestamp
    pub fn touch(&mut self) {
        self.modified_at = Utc::now();
    }
}
