//! Deducing a sample's [`TileFormat`] from its folder layout

use crate::axis::CoordinateAxis;
use crate::config::TileSourceConfig;
use crate::decode::stack_info;
use crate::error::Result;
use crate::format::TileFormat;
use crate::resolver::FileResolver;
use std::path::{Path, PathBuf};

/// Measure channel count, octree depth, tile and volume size
///
/// - channels: consecutive `default.<c>.tif` files in the top folder
/// - slice axes: presence of `YZ.0.tif`, `ZX.0.tif`, `default.0.tif`
/// - depth: levels reachable by descending into the first child `1`..`8`
///   that contains `default.0.tif`
/// - tile size: first page dimensions and page count of the top stack
///
/// A folder without `default.0.tif` yields a format with zero channels.
pub fn sniff_metadata(resolver: &dyn FileResolver, config: &TileSourceConfig) -> Result<TileFormat> {
    let mut format = TileFormat::with_tile_size(config.default_tile_size);

    let z_stack = |folder: &Path| folder.join(CoordinateAxis::Z.stack_file_name(0));

    format.channel_count = (0..config.max_channels)
        .take_while(|c| resolver.exists(Path::new(&CoordinateAxis::Z.stack_file_name(*c))))
        .count();
    if format.channel_count == 0 {
        tracing::warn!("No channel stacks found under {:?}", resolver.resolve(Path::new("")));
        return Ok(format);
    }

    format.has_x_slices = resolver.exists(Path::new(&CoordinateAxis::X.stack_file_name(0)));
    format.has_y_slices = resolver.exists(Path::new(&CoordinateAxis::Y.stack_file_name(0)));
    format.has_z_slices = true;

    let mut depth = 0u32;
    let mut folder: Option<PathBuf> = Some(PathBuf::new());
    while let Some(current) = folder {
        depth += 1;
        if depth >= config.max_octree_depth {
            break;
        }
        folder = (1..=8)
            .map(|branch| current.join(branch.to_string()))
            .find(|child| resolver.exists(&z_stack(child)));
    }
    format.zoom_level_count = depth;

    let info = stack_info(&resolver.resolve(&z_stack(Path::new(""))))?;
    let zoom_factor = format.top_zoom_factor();
    format.tile_size = [info.width, info.height, info.pages as u32];
    format.volume_size = format.tile_size.map(|d| u64::from(d) * zoom_factor);
    format.bit_depth = info.bit_depth;
    format.intensity_max = ((1u64 << info.bit_depth) - 1) as u32;

    tracing::info!(
        "Sniffed sample: {} channels, {} levels, tile {:?}, volume {:?}, {} bit",
        format.channel_count,
        format.zoom_level_count,
        format.tile_size,
        format.volume_size,
        format.bit_depth
    );
    Ok(format)
}
