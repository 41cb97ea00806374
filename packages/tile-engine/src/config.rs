/// Configuration for a block TIFF tile source
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Deepest octree the metadata sniffer will descend into
const MAX_SUPPORTED_OCTREE_DEPTH: u32 = 24;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TileSourceConfig {
    /// Top folder of the octree (contains `default.0.tif`)
    pub top_folder: PathBuf,

    /// Upper bound when counting channel files
    pub max_channels: usize,

    /// Upper bound when descending the octree to measure its depth
    pub max_octree_depth: u32,

    /// Tile size assumed until the first stack has been read
    pub default_tile_size: [u32; 3],

    /// Log aggregated load timings when the loader is dropped
    pub report_load_timings: bool,
}

impl Default for TileSourceConfig {
    fn default() -> Self {
        Self {
            top_folder: PathBuf::new(),
            max_channels: 16,
            max_octree_depth: 16,
            default_tile_size: [512, 512, 64],
            report_load_timings: true,
        }
    }
}

impl TileSourceConfig {
    pub fn for_folder(top_folder: impl Into<PathBuf>) -> Self {
        Self {
            top_folder: top_folder.into(),
            ..Default::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.top_folder.as_os_str().is_empty() {
            return Err("top_folder cannot be empty".to_string());
        }

        if self.max_channels == 0 {
            return Err("max_channels must be greater than 0".to_string());
        }

        if self.max_octree_depth == 0 {
            return Err("max_octree_depth must be greater than 0".to_string());
        }

        if self.max_octree_depth > MAX_SUPPORTED_OCTREE_DEPTH {
            return Err(format!(
                "max_octree_depth cannot exceed {}",
                MAX_SUPPORTED_OCTREE_DEPTH
            ));
        }

        if self.default_tile_size.iter().any(|d| *d == 0) {
            return Err("default_tile_size dimensions must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Load configuration from a JSON file; missing keys use defaults
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| format!("cannot parse {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }
}
