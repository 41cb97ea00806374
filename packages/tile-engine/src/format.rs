//! Volume and tile geometry of an octree sample

use crate::axis::CoordinateAxis;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileFormat {
    /// Number of octree levels; zoom `zoom_level_count - 1` is the top folder
    pub zoom_level_count: u32,
    /// Voxels per tile along X, Y and Z
    pub tile_size: [u32; 3],
    /// Full-resolution volume size in voxels
    pub volume_size: [u64; 3],
    pub channel_count: usize,
    pub bit_depth: u32,
    pub intensity_max: u32,
    pub has_x_slices: bool,
    pub has_y_slices: bool,
    pub has_z_slices: bool,
}

impl TileFormat {
    /// Single-level, single-channel 16-bit format with the given tile size
    pub fn with_tile_size(tile_size: [u32; 3]) -> Self {
        Self {
            zoom_level_count: 1,
            tile_size,
            volume_size: tile_size.map(u64::from),
            channel_count: 1,
            bit_depth: 16,
            intensity_max: u16::MAX as u32,
            has_x_slices: false,
            has_y_slices: false,
            has_z_slices: true,
        }
    }

    pub fn has_slices(&self, axis: CoordinateAxis) -> bool {
        match axis {
            CoordinateAxis::X => self.has_x_slices,
            CoordinateAxis::Y => self.has_y_slices,
            CoordinateAxis::Z => self.has_z_slices,
        }
    }

    /// Downsampling factor of the top folder relative to full resolution
    pub fn top_zoom_factor(&self) -> u64 {
        1u64 << self.zoom_level_count.saturating_sub(1)
    }
}

impl Default for TileFormat {
    fn default() -> Self {
        Self::with_tile_size([512, 512, 64])
    }
}
