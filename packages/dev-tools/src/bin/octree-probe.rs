//! Octree Probe Binary
//!
//! Inspects a block TIFF octree sample: prints the sniffed tile format and,
//! for a given tile index, the folder and stack page it maps to. Optionally
//! loads the tile and writes its first channel as a TIFF.
//!
//! # Usage
//!
//! ```bash
//! # Print the sample's tile format
//! cargo run --bin octree-probe -- /data/sample
//!
//! # Locate and load one tile: x y z zoom axis
//! cargo run --bin octree-probe -- /data/sample 3 0 0 0 Z
//!
//! # Also dump channel 0
//! cargo run --bin octree-probe -- /data/sample 3 0 0 0 Z --dump tile.tif
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Logging level (e.g., "info", "debug", "trace")

use anyhow::{anyhow, bail, Context};
use lvv_tile_engine::{
    octree_folder, relative_slice, BlockTiffOctreeLoader, CoordinateAxis, TileError, TileIndex,
    TileSourceConfig,
};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

fn parse_axis(s: &str) -> anyhow::Result<CoordinateAxis> {
    match s.to_ascii_uppercase().as_str() {
        "X" => Ok(CoordinateAxis::X),
        "Y" => Ok(CoordinateAxis::Y),
        "Z" => Ok(CoordinateAxis::Z),
        other => bail!("unknown axis {:?}, expected X, Y or Z", other),
    }
}

fn parse_index(args: &[String]) -> anyhow::Result<TileIndex> {
    let [x, y, z, zoom, axis] = args else {
        bail!("expected tile index as: x y z zoom axis");
    };
    Ok(TileIndex::new(
        x.parse().context("x")?,
        y.parse().context("y")?,
        z.parse().context("z")?,
        zoom.parse().context("zoom")?,
        parse_axis(axis)?,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let dump = match args.iter().position(|a| a == "--dump") {
        Some(pos) => {
            let path = args
                .get(pos + 1)
                .cloned()
                .ok_or_else(|| anyhow!("--dump needs a file name"))?;
            args.drain(pos..pos + 2);
            Some(PathBuf::from(path))
        }
        None => None,
    };
    let Some(top_folder) = args.first().cloned() else {
        bail!("usage: octree-probe <top-folder> [x y z zoom axis] [--dump out.tif]");
    };

    let config = TileSourceConfig::for_folder(&top_folder);
    let loader = Arc::new(BlockTiffOctreeLoader::open(&config)?);
    println!("{}", serde_json::to_string_pretty(loader.format())?);

    if args.len() == 1 {
        return Ok(());
    }
    let index = parse_index(&args[1..])?;
    let folder = octree_folder(&index, loader.format())?;
    let slice = relative_slice(&index, loader.format())?;
    println!("tile {} -> folder {:?}, page {}", index, folder, slice);

    match loader.clone().load_tile(index).await {
        Ok(tile) => {
            let max = tile.data.iter().copied().max().unwrap_or(0);
            println!(
                "loaded {}x{} with {} channels, {} bit, max sample {}",
                tile.width, tile.height, tile.channels, tile.bit_depth, max
            );
            if let Some(path) = dump {
                let plane = tile
                    .channel_plane(0)
                    .ok_or_else(|| anyhow!("tile has no channels"))?;
                plane.save(&path)?;
                tracing::info!("Wrote channel 0 to {}", path.display());
            }
        }
        Err(TileError::MissingTile(path)) => {
            println!("tile is absent (no {})", path.display());
        }
        Err(e) => return Err(e.into()),
    }

    loader.load_timer().report();
    Ok(())
}
