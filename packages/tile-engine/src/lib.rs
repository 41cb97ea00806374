/// LVV Tile Engine - Octree Tile Addressing and Block TIFF Decoding
///
/// This crate locates and decodes 2D tiles of a Large Volume Viewer sample
/// stored as a Z-order octree of multi-page TIFF stacks.
///
/// # Features
///
/// - **Octree Addressing**: Tile index to folder path and stack page
/// - **Metadata Sniffing**: Channel count, depth and tile size from the layout
/// - **Band Merge**: One stack per channel merged into interleaved textures
/// - **Async Loading**: Decoding runs on tokio's blocking pool
///
/// # Example
///
/// ```ignore
/// use lvv_tile_engine::{BlockTiffOctreeLoader, CoordinateAxis, TileIndex, TileSourceConfig};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = TileSourceConfig::for_folder("/data/sample");
///     let loader = Arc::new(BlockTiffOctreeLoader::open(&config)?);
///
///     let index = TileIndex::new(0, 0, 0, 0, CoordinateAxis::Z);
///     let tile = loader.load_tile(index).await?;
///     println!("{}x{} with {} channels", tile.width, tile.height, tile.channels);
///
///     Ok(())
/// }
/// ```
pub mod axis;
pub mod config;
pub mod decode;
pub mod error;
pub mod format;
pub mod loader;
pub mod metadata;
pub mod octree;
pub mod resolver;
pub mod tile_index;
pub mod timer;

// Re-export main types
pub use axis::CoordinateAxis;
pub use config::TileSourceConfig;
pub use decode::{TextureData, StackInfo};
pub use error::{Result, TileError};
pub use format::TileFormat;
pub use loader::BlockTiffOctreeLoader;
pub use metadata::sniff_metadata;
pub use octree::{octree_folder, octree_path, relative_slice};
pub use resolver::{FileResolver, LocalFileResolver};
pub use tile_index::TileIndex;
pub use timer::{LoadTimer, TimingStats};
