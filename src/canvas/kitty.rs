//! Kitty Graphics Protocol rasterizer
//!
//! Sends palette-mapped RGBA pixels (`f=32`) zlib-compressed (`o=z`) and
//! base64-encoded in 4096-byte chunks. Supported by: Kitty, WezTerm, Ghostty
//!
//! Protocol: <https://sw.kovidgoyal.net/kitty/graphics-protocol/>

use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;
use tracing::{debug, warn};

use super::caps::RasterProtocol;
use super::palette::{Palette, PaletteCache, PaletteKey, PaletteMode, TRANSPARENT_INDEX};
use super::rasterizer::{raster_bounds, FrameView, RasterOutput, RasterPayload, Rasterizer, SkipReason};
use crate::errors::{CanvasError, Result};

const CHUNK_SIZE: usize = 4096;

static NEXT_IMAGE_ID: AtomicU32 = AtomicU32::new(1);

/// Kitty Graphics Protocol rasterizer
///
/// Each instance owns one image id; re-sending under the same id replaces
/// the previous frame in the terminal.
#[derive(Debug)]
pub struct KittyRasterizer {
    image_id: u32,
    /// Compression level (0-9, higher = smaller but slower)
    compression: u32,
    palette: PaletteCache,
    indices: Vec<u8>,
    rgba: Vec<u8>,
}

impl Default for KittyRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl KittyRasterizer {
    pub fn new() -> Self {
        Self {
            image_id: NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed),
            compression: 6,
            palette: PaletteCache::new(),
            indices: Vec::new(),
            rgba: Vec::new(),
        }
    }

    pub fn image_id(&self) -> u32 {
        self.image_id
    }

    /// Escape sequence that removes this rasterizer's image from the screen
    pub fn delete_sequence(&self) -> String {
        delete_sequence(self.image_id)
    }
}

/// Remove an image and its placements
pub fn delete_sequence(image_id: u32) -> String {
    format!("\x1b_Ga=d,d=I,i={image_id},q=2\x1b\\")
}

/// Expand palette indices back to RGBA bytes
fn expand_indices(indices: &[u8], palette: &Palette, out: &mut Vec<u8>) {
    out.clear();
    out.reserve(indices.len() * 4);
    for &idx in indices {
        if idx == TRANSPARENT_INDEX {
            out.extend_from_slice(&[0, 0, 0, 0]);
        } else {
            let [r, g, b] = palette.rgb(idx);
            out.extend_from_slice(&[r, g, b, 255]);
        }
    }
}

fn compress(rgba: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder
        .write_all(rgba)
        .and_then(|()| encoder.finish())
        .map_err(|e| CanvasError::encode("kitty", e))
}

/// Build the transmit-and-display escape sequence
pub fn build_kitty_sequence(b64: &str, width: u32, height: u32, cols: u16, rows: u16, image_id: u32) -> String {
    let mut result = String::with_capacity(b64.len() + 128);

    let chunks: Vec<&[u8]> = b64.as_bytes().chunks(CHUNK_SIZE).collect();
    let num_chunks = chunks.len().max(1);

    for i in 0..num_chunks {
        let chunk = chunks.get(i).copied().unwrap_or_default();
        // base64 output is ASCII
        let chunk = std::str::from_utf8(chunk).unwrap_or_default();
        let more = u8::from(i + 1 < num_chunks);

        result.push_str("\x1b_G");
        if i == 0 {
            // a=T: transmit and display, f=32: RGBA, o=z: zlib, q=2: no replies
            result.push_str(&format!(
                "a=T,f=32,o=z,s={width},v={height},c={cols},r={rows},i={image_id},q=2,m={more};{chunk}"
            ));
        } else {
            result.push_str(&format!("m={more};{chunk}"));
        }
        result.push_str("\x1b\\");
    }

    result
}

impl KittyRasterizer {
    fn encode(&mut self, frame: &FrameView<'_>, bounds: Rect) -> Result<String> {
        let mode = if frame.dynamic {
            PaletteMode::Keyframe
        } else {
            PaletteMode::Cached
        };
        let key = PaletteKey {
            source: frame.source_id,
            width: frame.width,
            height: frame.height,
        };
        let palette = self.palette.index(mode, key, frame.pixels, &mut self.indices);
        expand_indices(&self.indices, palette, &mut self.rgba);

        let compressed = compress(&self.rgba, self.compression)?;
        let b64 = BASE64.encode(&compressed);
        debug!(
            "Kitty payload: {} raw -> {} compressed bytes",
            self.rgba.len(),
            compressed.len()
        );
        Ok(build_kitty_sequence(
            &b64,
            frame.width,
            frame.height,
            bounds.width,
            bounds.height,
            self.image_id,
        ))
    }
}

impl Rasterizer for KittyRasterizer {
    fn rasterize(&mut self, frame: &FrameView<'_>, area: Rect, _buf: &mut Buffer, _inherited: Style) -> RasterOutput {
        let bounds = match raster_bounds(frame, area) {
            Ok(b) => b,
            Err(reason) => return RasterOutput::Skipped(reason),
        };
        match self.encode(frame, bounds) {
            Ok(data) => RasterOutput::Payload(RasterPayload {
                protocol: RasterProtocol::Kitty,
                data,
                bounds,
            }),
            Err(e) => {
                warn!("Dropping kitty frame: {}", e);
                RasterOutput::Skipped(SkipReason::EncodeFailed)
            }
        }
    }

    fn name(&self) -> &'static str {
        "Kitty"
    }

    fn invalidate(&mut self) {
        self.palette.invalidate();
        self.indices = Vec::new();
        self.rgba = Vec::new();
    }

    fn has_valid_cache(&self) -> bool {
        self.palette.is_valid()
    }
}
