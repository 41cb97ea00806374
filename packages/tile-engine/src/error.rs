/// Error types for the tile engine
use crate::tile_index::TileIndex;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TileError {
    /// Expected stack file does not exist; the tile is simply absent
    #[error("Tile file not found: {0}")]
    MissingTile(PathBuf),

    /// Index does not map into the octree of this volume
    #[error("Bad tile index {0}")]
    BadTileIndex(TileIndex),

    #[error("Tile load failed: {0}")]
    LoadError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TIFF decoding failed: {0}")]
    TiffError(#[from] tiff::TiffError),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl TileError {
    pub fn load(msg: impl Into<String>) -> Self {
        Self::LoadError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, TileError>;
