//! Integration tests for the block TIFF octree loader
//!
//! Each test writes a small two-level sample into a temporary folder:
//!
//! ```text
//! top/default.{0,1}.tif   4x4, 3 pages   (zoom 1)
//! top/ZX.{0,1}.tif        4x3, 4 pages   (zoom 1, Y slices)
//! top/3/default.{0,1}.tif 4x4, 3 pages   (zoom 0, octant x=0 y=0 z=0)
//! ```
//!
//! Pixel values encode where they came from: `level * 1000 + channel * 100 +
//! page * 10 + (pixel % 10)`.

use anyhow::Result;
use lvv_tile_engine::{
    BlockTiffOctreeLoader, CoordinateAxis, TileError, TileIndex, TileSourceConfig,
};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tiff::encoder::{colortype, TiffEncoder};

fn write_stack(path: &Path, width: u32, height: u32, pages: usize, base: u16) -> Result<()> {
    let mut encoder = TiffEncoder::new(File::create(path)?)?;
    for page in 0..pages {
        let data: Vec<u16> = (0..width * height)
            .map(|i| base + page as u16 * 10 + (i % 10) as u16)
            .collect();
        encoder.write_image::<colortype::Gray16>(width, height, &data)?;
    }
    Ok(())
}

fn write_sample() -> Result<TempDir> {
    let temp_dir = TempDir::new()?;
    let top = temp_dir.path();
    let child = top.join("3");
    std::fs::create_dir(&child)?;
    for channel in 0..2u16 {
        write_stack(
            &top.join(format!("default.{}.tif", channel)),
            4,
            4,
            3,
            1000 + channel * 100,
        )?;
        write_stack(
            &top.join(format!("ZX.{}.tif", channel)),
            4,
            3,
            4,
            5000 + channel * 100,
        )?;
        write_stack(
            &child.join(format!("default.{}.tif", channel)),
            4,
            4,
            3,
            channel * 100,
        )?;
    }
    Ok(temp_dir)
}

fn open_loader(top: &Path) -> Result<BlockTiffOctreeLoader> {
    let config = TileSourceConfig {
        report_load_timings: false,
        ..TileSourceConfig::for_folder(top)
    };
    Ok(BlockTiffOctreeLoader::open(&config)?)
}

#[test]
fn test_sniff_metadata_measures_sample() -> Result<()> {
    let sample = write_sample()?;
    let loader = open_loader(sample.path())?;
    let format = loader.format();

    assert_eq!(format.channel_count, 2);
    assert_eq!(format.zoom_level_count, 2);
    assert_eq!(format.tile_size, [4, 4, 3]);
    assert_eq!(format.volume_size, [8, 8, 6]);
    assert_eq!(format.bit_depth, 16);
    assert_eq!(format.intensity_max, 65535);
    assert!(format.has_y_slices);
    assert!(!format.has_x_slices);
    assert!(format.has_z_slices);
    Ok(())
}

#[test]
fn test_load_top_level_tile() -> Result<()> {
    let sample = write_sample()?;
    let loader = open_loader(sample.path())?;

    // zoom 1 voxel z = 2 -> downsampled slice 1
    let tile = loader.load_to_ram(&TileIndex::new(0, 0, 2, 1, CoordinateAxis::Z))?;

    assert_eq!((tile.width, tile.height, tile.channels), (4, 4, 2));
    assert_eq!(tile.sample(0, 0, 0), Some(1010));
    assert_eq!(tile.sample(0, 0, 1), Some(1110));
    assert_eq!(tile.sample(3, 0, 1), Some(1113));
    Ok(())
}

#[test]
fn test_load_full_resolution_tile_from_child_folder() -> Result<()> {
    let sample = write_sample()?;
    let loader = open_loader(sample.path())?;

    let tile = loader.load_to_ram(&TileIndex::new(0, 0, 2, 0, CoordinateAxis::Z))?;

    assert_eq!(tile.sample(1, 0, 0), Some(21));
    assert_eq!(tile.sample(1, 0, 1), Some(121));
    Ok(())
}

#[test]
fn test_y_slices_are_flipped() -> Result<()> {
    let sample = write_sample()?;
    let loader = open_loader(sample.path())?;

    let tile = loader.load_to_ram(&TileIndex::new(0, 0, 0, 1, CoordinateAxis::Y))?;

    // Y slice 0 is the last page of the 4-page ZX stack
    assert_eq!((tile.width, tile.height), (4, 3));
    assert_eq!(tile.sample(0, 0, 0), Some(5030));
    Ok(())
}

#[test]
fn test_absent_octant_is_missing_tile() -> Result<()> {
    let sample = write_sample()?;
    let loader = open_loader(sample.path())?;

    let err = loader
        .load_to_ram(&TileIndex::new(1, 0, 0, 0, CoordinateAxis::Z))
        .unwrap_err();
    match err {
        TileError::MissingTile(path) => assert!(path.ends_with("4/default.0.tif")),
        other => panic!("Expected MissingTile, got {:?}", other),
    }

    // No X stacks at all
    let err = loader
        .load_to_ram(&TileIndex::new(0, 0, 0, 1, CoordinateAxis::X))
        .unwrap_err();
    assert!(matches!(err, TileError::MissingTile(_)));
    Ok(())
}

#[test]
fn test_out_of_volume_index_is_bad_tile_index() -> Result<()> {
    let sample = write_sample()?;
    let loader = open_loader(sample.path())?;

    let err = loader
        .load_to_ram(&TileIndex::new(2, 0, 0, 0, CoordinateAxis::Z))
        .unwrap_err();
    assert!(matches!(err, TileError::BadTileIndex(_)));
    Ok(())
}

#[test]
fn test_empty_folder_is_rejected() -> Result<()> {
    let empty = TempDir::new()?;
    let err = open_loader(empty.path()).err().expect("open should fail");
    assert!(err.to_string().contains("no channel stacks"));
    Ok(())
}

#[test]
fn test_eight_bit_stacks_are_widened() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut encoder = TiffEncoder::new(File::create(temp_dir.path().join("default.0.tif"))?)?;
    encoder.write_image::<colortype::Gray8>(2, 2, &[1u8, 2, 3, 250])?;
    drop(encoder);

    let loader = open_loader(temp_dir.path())?;
    assert_eq!(loader.format().bit_depth, 8);
    assert_eq!(loader.format().intensity_max, 255);

    let tile = loader.load_to_ram(&TileIndex::new(0, 0, 0, 0, CoordinateAxis::Z))?;
    assert_eq!(tile.data, vec![1, 2, 3, 250]);
    assert_eq!(tile.bit_depth, 8);
    Ok(())
}

#[tokio::test]
async fn test_async_load_matches_blocking_load() -> Result<()> {
    let sample = write_sample()?;
    let loader = Arc::new(open_loader(sample.path())?);
    let index = TileIndex::new(0, 0, 1, 1, CoordinateAxis::Z);

    let blocking = loader.load_to_ram(&index)?;
    let threaded = loader.clone().load_tile(index).await?;
    assert_eq!(blocking, threaded);

    let timer = loader.load_timer();
    assert_eq!(timer.stats()["finished slice load"].count, 2);
    Ok(())
}
