//! Multi-page TIFF stack decoding and channel band merge
//!
//! Each channel of a tile lives in its own uncompressed grayscale stack, one
//! page per slice. A tile is produced by decoding the same page from every
//! channel stack and interleaving the samples.

use crate::error::{Result, TileError};
use image::{ImageBuffer, Luma};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::ColorType;

/// Decoded tile, samples interleaved by channel, widened to 16 bits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    /// Bit depth of the source stacks
    pub bit_depth: u32,
    pub data: Vec<u16>,
}

impl TextureData {
    pub fn sample(&self, x: u32, y: u32, channel: usize) -> Option<u16> {
        if x >= self.width || y >= self.height || channel >= self.channels {
            return None;
        }
        let pixel = y as usize * self.width as usize + x as usize;
        self.data.get(pixel * self.channels + channel).copied()
    }

    /// One channel as a grayscale image
    pub fn channel_plane(&self, channel: usize) -> Option<ImageBuffer<Luma<u16>, Vec<u16>>> {
        if channel >= self.channels {
            return None;
        }
        let plane: Vec<u16> = self
            .data
            .iter()
            .skip(channel)
            .step_by(self.channels)
            .copied()
            .collect();
        ImageBuffer::from_raw(self.width, self.height, plane)
    }
}

/// Shape of a stack file, read from its first page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackInfo {
    pub width: u32,
    pub height: u32,
    pub pages: usize,
    pub bit_depth: u32,
}

/// One decoded page of one channel
#[derive(Debug, Clone)]
pub struct StackPage {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u32,
    pub pixels: Vec<u16>,
}

fn open_stack(path: &Path) -> Result<Decoder<BufReader<File>>> {
    let file = File::open(path)?;
    Ok(Decoder::new(BufReader::new(file))?)
}

fn gray_bit_depth<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<u32> {
    match decoder.colortype()? {
        ColorType::Gray(bits) if bits == 8 || bits == 16 => Ok(u32::from(bits)),
        other => Err(TileError::load(format!(
            "unsupported stack color type {:?}",
            other
        ))),
    }
}

pub fn stack_info(path: &Path) -> Result<StackInfo> {
    let mut decoder = open_stack(path)?;
    let (width, height) = decoder.dimensions()?;
    let bit_depth = gray_bit_depth(&mut decoder)?;
    let mut pages = 1;
    while decoder.more_images() {
        decoder.next_image()?;
        pages += 1;
    }
    Ok(StackInfo {
        width,
        height,
        pages,
        bit_depth,
    })
}

/// Decode page `page` of the stack at `path`
pub fn read_page(path: &Path, page: usize) -> Result<StackPage> {
    let mut decoder = open_stack(path)?;
    for seen in 0..page {
        if !decoder.more_images() {
            return Err(TileError::load(format!(
                "{} has {} pages, slice {} requested",
                path.display(),
                seen + 1,
                page
            )));
        }
        decoder.next_image()?;
    }

    let (width, height) = decoder.dimensions()?;
    let bit_depth = gray_bit_depth(&mut decoder)?;
    let pixels = match decoder.read_image()? {
        DecodingResult::U16(pixels) => pixels,
        DecodingResult::U8(pixels) => pixels.into_iter().map(u16::from).collect(),
        _ => {
            return Err(TileError::load(format!(
                "unsupported sample format in {}",
                path.display()
            )))
        }
    };
    if pixels.len() != width as usize * height as usize {
        return Err(TileError::load(format!(
            "{} page {} has {} samples for {}x{}",
            path.display(),
            page,
            pixels.len(),
            width,
            height
        )));
    }
    Ok(StackPage {
        width,
        height,
        bit_depth,
        pixels,
    })
}

/// Interleave single-channel pages into one texture
pub fn band_merge(pages: Vec<StackPage>) -> Result<TextureData> {
    let Some(first) = pages.first() else {
        return Err(TileError::load("no channels to merge"));
    };
    let (width, height, bit_depth) = (first.width, first.height, first.bit_depth);
    if pages
        .iter()
        .any(|p| p.width != width || p.height != height)
    {
        return Err(TileError::load("channel pages differ in size"));
    }

    let channels = pages.len();
    if channels == 1 {
        let page = pages.into_iter().next().map(|p| p.pixels).unwrap_or_default();
        return Ok(TextureData {
            width,
            height,
            channels,
            bit_depth,
            data: page,
        });
    }

    let pixel_count = width as usize * height as usize;
    let mut data = Vec::with_capacity(pixel_count * channels);
    for i in 0..pixel_count {
        for page in &pages {
            data.push(page.pixels[i]);
        }
    }
    Ok(TextureData {
        width,
        height,
        channels,
        bit_depth,
        data,
    })
}
