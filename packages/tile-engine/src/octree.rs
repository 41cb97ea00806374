//! Octree folder addressing
//!
//! A sample is stored as a Z-order octree of folders. The top folder holds
//! the most downsampled stack; each child folder `1`..`8` holds one octant at
//! twice the resolution of its parent. Within an octant the segment number
//! is `1 + dx + 2 * (1 - dy) + 4 * dz`: tile Y grows downward while octree Y
//! grows upward.

use crate::axis::CoordinateAxis;
use crate::error::{Result, TileError};
use crate::format::TileFormat;
use crate::tile_index::TileIndex;
use std::path::PathBuf;

/// Downsampling factor of `index.zoom`, rejecting zooms deeper than the octree
fn zoom_factor(index: &TileIndex, format: &TileFormat) -> Result<i64> {
    if index.zoom > format.zoom_level_count {
        return Err(TileError::BadTileIndex(*index));
    }
    2i64.checked_pow(index.zoom).ok_or(TileError::BadTileIndex(*index))
}

/// Folder segments from the top folder down to the stack holding `index`
///
/// In-plane coordinates are tile coordinates at the index's zoom. The slice
/// coordinate is a voxel coordinate, so it is first reduced to a tile
/// coordinate at that zoom.
///
/// Both `zoom_level_count - 1` and `zoom_level_count` address the top folder
/// and yield an empty path.
pub fn octree_path(index: &TileIndex, format: &TileFormat) -> Result<Vec<u8>> {
    let factor = zoom_factor(index, format)?;
    let depth = format.zoom_level_count as i64 - index.zoom as i64;
    if depth > 62 {
        return Err(TileError::BadTileIndex(*index));
    }

    let axis = index.slice_axis.index();
    let mut xyz = index.coordinates().map(i64::from);
    let tile_depth = i64::from(format.tile_size[axis].max(1));
    xyz[axis] /= tile_depth;
    xyz[axis] /= factor;

    let mut path = Vec::with_capacity(depth.max(1) as usize - 1);
    for d in 0..depth - 1 {
        let scale = 1i64 << (depth - 2 - d);
        let ds = xyz.map(|c| c / scale);
        if ds.iter().any(|b| !(0..=1).contains(b)) {
            return Err(TileError::BadTileIndex(*index));
        }
        for c in xyz.iter_mut() {
            *c %= scale;
        }
        path.push((1 + ds[0] + 2 * (1 - ds[1]) + 4 * ds[2]) as u8);
    }
    Ok(path)
}

/// Path of the folder holding `index`, relative to the top folder
pub fn octree_folder(index: &TileIndex, format: &TileFormat) -> Result<PathBuf> {
    Ok(octree_path(index, format)?
        .iter()
        .map(|segment| segment.to_string())
        .collect())
}

/// Page within the stack that holds the slice of `index`
pub fn relative_slice(index: &TileIndex, format: &TileFormat) -> Result<usize> {
    let factor = zoom_factor(index, format)?;
    let axis = index.slice_axis;
    let coordinate = i64::from(index.coordinate(axis));
    if coordinate < 0 {
        return Err(TileError::BadTileIndex(*index));
    }
    let tile_depth = i64::from(format.tile_size[axis.index()].max(1));
    let absolute = coordinate / factor;
    let mut relative = absolute % tile_depth;
    // Tile Y is flipped relative to the volume
    if axis == CoordinateAxis::Y {
        relative = tile_depth - relative - 1;
    }
    Ok(relative as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(depth: u32) -> TileFormat {
        TileFormat {
            zoom_level_count: depth,
            ..TileFormat::with_tile_size([512, 512, 64])
        }
    }

    #[test]
    fn test_three_level_path_has_two_segments() {
        let index = TileIndex::new(3, 0, 0, 0, CoordinateAxis::Z);
        let path = octree_path(&index, &format(3)).unwrap();
        assert_eq!(path.len(), 2);
        assert!(path.iter().all(|s| (1..=8).contains(s)));
        assert_eq!(path, vec![4, 4]);
    }

    #[test]
    fn test_top_level_has_empty_path() {
        let index = TileIndex::new(0, 0, 0, 2, CoordinateAxis::Z);
        assert!(octree_path(&index, &format(3)).unwrap().is_empty());
        assert_eq!(octree_folder(&index, &format(3)).unwrap(), PathBuf::new());
    }

    #[test]
    fn test_y_and_z_bits_select_octant() {
        // Bottom row (y = 1), far slab (z = 64 voxels = tile 1)
        let index = TileIndex::new(0, 1, 64, 1, CoordinateAxis::Z);
        // zoom 1: z tile = 64 / 64 / 2 = 0
        assert_eq!(octree_path(&index, &format(3)).unwrap(), vec![1]);

        // Full resolution: every bit lands in the second level
        let index = TileIndex::new(1, 1, 64, 0, CoordinateAxis::Z);
        assert_eq!(octree_path(&index, &format(3)).unwrap(), vec![3, 6]);
    }

    #[test]
    fn test_out_of_range_index_is_rejected() {
        let index = TileIndex::new(4, 0, 0, 0, CoordinateAxis::Z);
        assert!(matches!(
            octree_path(&index, &format(3)),
            Err(TileError::BadTileIndex(_))
        ));

        let index = TileIndex::new(-1, 0, 0, 0, CoordinateAxis::Z);
        assert!(octree_path(&index, &format(3)).is_err());

        let index = TileIndex::new(0, 0, 0, 4, CoordinateAxis::Z);
        assert!(octree_path(&index, &format(3)).is_err());
    }

    #[test]
    fn test_folder_joins_segments() {
        let index = TileIndex::new(3, 0, 0, 0, CoordinateAxis::Z);
        assert_eq!(
            octree_folder(&index, &format(3)).unwrap(),
            PathBuf::from("4").join("4")
        );
    }

    #[test]
    fn test_relative_slice() {
        let f = format(3);
        let index = TileIndex::new(0, 0, 70, 0, CoordinateAxis::Z);
        assert_eq!(relative_slice(&index, &f).unwrap(), 6);

        // zoom 1 halves the voxel coordinate first
        let index = TileIndex::new(0, 0, 70, 1, CoordinateAxis::Z);
        assert_eq!(relative_slice(&index, &f).unwrap(), 35);

        // Y slices count from the other end
        let index = TileIndex::new(0, 0, 0, 0, CoordinateAxis::Y);
        assert_eq!(relative_slice(&index, &f).unwrap(), 511);
    }

    #[test]
    fn test_zoom_one_past_top_level_addresses_top_folder() {
        let index = TileIndex::new(0, 0, 0, 3, CoordinateAxis::Z);
        assert!(octree_path(&index, &format(3)).unwrap().is_empty());
        assert_eq!(relative_slice(&index, &format(3)).unwrap(), 0);
    }

    #[test]
    fn test_relative_slice_rejects_zoom_beyond_octree() {
        let index = TileIndex::new(0, 0, 70, 4, CoordinateAxis::Z);
        assert!(matches!(
            relative_slice(&index, &format(3)),
            Err(TileError::BadTileIndex(_))
        ));

        // Deep enough that the downsampling factor no longer fits
        let index = TileIndex::new(0, 0, 70, 64, CoordinateAxis::Z);
        assert!(matches!(
            relative_slice(&index, &format(80)),
            Err(TileError::BadTileIndex(_))
        ));
        assert!(octree_path(&index, &format(80)).is_err());
        assert!(octree_path(&TileIndex::new(0, 0, 0, 0, CoordinateAxis::Z), &format(80)).is_err());
    }
}
