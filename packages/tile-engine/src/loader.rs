//! Block TIFF octree tile loader
//!
//! Layout: a Z-order octree of folders, one uncompressed 8 or 16 bit stack per
//! channel and slice axis in each folder (`default.<c>.tif` for Z slices,
//! `ZX.<c>.tif` for Y, `YZ.<c>.tif` for X).
//!
//! # Architecture
//!
//! - `load_to_ram` is blocking: resolve folder, decode one page per channel,
//!   band merge
//! - `load_tile` moves that work onto tokio's blocking pool
//! - Every load keeps its own [`LoadTimer`] and merges it into the loader's
//!   shared timer when done

use crate::config::TileSourceConfig;
use crate::decode::{band_merge, read_page, TextureData};
use crate::error::{Result, TileError};
use crate::format::TileFormat;
use crate::metadata::sniff_metadata;
use crate::octree::{octree_folder, relative_slice};
use crate::resolver::{FileResolver, LocalFileResolver};
use crate::tile_index::TileIndex;
use crate::timer::LoadTimer;
use std::sync::{Arc, Mutex, PoisonError};

pub struct BlockTiffOctreeLoader {
    resolver: Arc<dyn FileResolver>,
    format: TileFormat,
    load_timer: Mutex<LoadTimer>,
    report_on_drop: bool,
}

impl BlockTiffOctreeLoader {
    /// Open the sample under `config.top_folder` on local disk
    pub fn open(config: &TileSourceConfig) -> Result<Self> {
        let resolver = Arc::new(LocalFileResolver::new(config.top_folder.clone()));
        Self::with_resolver(resolver, config)
    }

    pub fn with_resolver(resolver: Arc<dyn FileResolver>, config: &TileSourceConfig) -> Result<Self> {
        config.validate().map_err(TileError::ConfigError)?;
        let format = sniff_metadata(resolver.as_ref(), config)?;
        if format.channel_count == 0 {
            return Err(TileError::ConfigError(format!(
                "no channel stacks under {}",
                config.top_folder.display()
            )));
        }
        Ok(Self {
            resolver,
            format,
            load_timer: Mutex::new(LoadTimer::new()),
            report_on_drop: config.report_load_timings,
        })
    }

    pub fn format(&self) -> &TileFormat {
        &self.format
    }

    /// Decode the tile at `index`
    ///
    /// A stack file that does not exist yields [`TileError::MissingTile`];
    /// callers treat that as an empty tile rather than a failure.
    pub fn load_to_ram(&self, index: &TileIndex) -> Result<TextureData> {
        let mut local_timer = LoadTimer::new();
        local_timer.mark("starting slice load");

        let folder = octree_folder(index, &self.format)?;
        let slice = relative_slice(index, &self.format)?;

        let mut pages = Vec::with_capacity(self.format.channel_count);
        for channel in 0..self.format.channel_count {
            let relative = folder.join(index.slice_axis.stack_file_name(channel));
            if !self.resolver.exists(&relative) {
                return Err(TileError::MissingTile(self.resolver.resolve(&relative)));
            }
            pages.push(read_page(&self.resolver.resolve(&relative), slice)?);
        }
        local_timer.mark("decoded channels");

        let texture = band_merge(pages)?;
        local_timer.mark("finished slice load");
        tracing::trace!("Loaded tile {} from {:?} slice {}", index, folder, slice);

        self.load_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .merge(&local_timer);
        Ok(texture)
    }

    /// [`load_to_ram`](Self::load_to_ram) on the blocking thread pool
    pub async fn load_tile(self: Arc<Self>, index: TileIndex) -> Result<TextureData> {
        tokio::task::spawn_blocking(move || self.load_to_ram(&index))
            .await
            .map_err(|e| TileError::load(format!("tile load task failed: {}", e)))?
    }

    /// Snapshot of the aggregated load timings
    pub fn load_timer(&self) -> LoadTimer {
        self.load_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for BlockTiffOctreeLoader {
    fn drop(&mut self) {
        if self.report_on_drop {
            self.load_timer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .report();
        }
    }
}
