//! Samples and workspaces.

use super::annotation::{SampleId, WorkspaceId};
use super::geometry::Vec3;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Row-major 4x4 affine transform
pub type Matrix4 = [[f64; 4]; 4];

pub const IDENTITY: Matrix4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Apply an affine transform to a point
pub fn transform_point(m: &Matrix4, p: Vec3) -> Vec3 {
    let row = |r: usize| m[r][0] * p.x + m[r][1] * p.y + m[r][2] * p.z + m[r][3];
    Vec3::new(row(0), row(1), row(2))
}

/// One imaged volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub id: SampleId,
    pub name: String,
    /// Top folder of the octree tile layout
    pub file_path: PathBuf,
    #[serde(default)]
    pub origin: Vec3,
    #[serde(default = "identity")]
    pub micron_to_vox: Matrix4,
    #[serde(default = "identity")]
    pub vox_to_micron: Matrix4,
}

fn identity() -> Matrix4 {
    IDENTITY
}

impl Sample {
    pub fn new(id: SampleId, name: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            name: name.into(),
            file_path: file_path.into(),
            origin: Vec3::default(),
            micron_to_vox: IDENTITY,
            vox_to_micron: IDENTITY,
        }
    }

    pub fn vox_to_micron(&self, voxel: Vec3) -> Vec3 {
        transform_point(&self.vox_to_micron, voxel)
    }

    pub fn micron_to_vox(&self, micron: Vec3) -> Vec3 {
        transform_point(&self.micron_to_vox, micron)
    }
}

/// A named collection of neurons traced in one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: WorkspaceId,
    pub sample_id: SampleId,
    pub name: String,
    /// Request path tracing whenever an anchor moves or is added
    #[serde(default)]
    pub auto_tracing: bool,
    /// Request point refinement for new anchors
    #[serde(default)]
    pub auto_point_refinement: bool,
    pub created_at: DateTime<Utc>,
}

impl Workspace {
    pub fn new(id: WorkspaceId, sample_id: SampleId, name: impl Into<String>) -> Self {
        Self {
            id,
            sample_id,
            name: name.into(),
            auto_tracing: false,
            auto_point_refinement: false,
            created_at: Utc::now(),
        }
    }
}
