//! Tile addressing

use crate::axis::CoordinateAxis;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of one 2D tile
///
/// `x`/`y`/`z` are tile coordinates on the two in-plane axes and a voxel
/// (slice) coordinate on the slice axis. `zoom` 0 is full resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileIndex {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub zoom: u32,
    pub slice_axis: CoordinateAxis,
}

impl TileIndex {
    pub fn new(x: i32, y: i32, z: i32, zoom: u32, slice_axis: CoordinateAxis) -> Self {
        Self {
            x,
            y,
            z,
            zoom,
            slice_axis,
        }
    }

    pub fn coordinates(&self) -> [i32; 3] {
        [self.x, self.y, self.z]
    }

    pub fn coordinate(&self, axis: CoordinateAxis) -> i32 {
        self.coordinates()[axis.index()]
    }
}

impl fmt::Display for TileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}) zoom {} axis {}",
            self.x, self.y, self.z, self.zoom, self.slice_axis
        )
    }
}
