//! iTerm2 inline image rasterizer
//!
//! The canvas is written as an indexed PNG (PLTE + tRNS) and sent with the
//! `OSC 1337 ; File=` sequence. `preserveAspectRatio=0` lets the terminal
//! stretch the image over exactly the placement cells.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;
use tracing::{debug, warn};

use super::caps::RasterProtocol;
use super::palette::{Palette, PaletteCache, PaletteKey, PaletteMode, TRANSPARENT_INDEX};
use super::rasterizer::{raster_bounds, FrameView, RasterOutput, RasterPayload, Rasterizer, SkipReason};
use crate::errors::{CanvasError, Result};

/// iTerm2 inline image rasterizer
#[derive(Debug, Default)]
pub struct ITerm2Rasterizer {
    palette: PaletteCache,
    indices: Vec<u8>,
}

impl ITerm2Rasterizer {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Encode palette indices as an 8-bit indexed PNG
pub fn encode_indexed_png(indices: &[u8], width: u32, height: u32, palette: &Palette) -> Result<Vec<u8>> {
    let has_transparent = indices.contains(&TRANSPARENT_INDEX);
    let entries = if has_transparent { 256 } else { palette.len() };

    let mut plte = Vec::with_capacity(entries * 3);
    for i in 0..entries {
        let rgb = if i < palette.len() { palette.colors()[i] } else { [0, 0, 0] };
        plte.extend_from_slice(&rgb);
    }

    let fail = |e: png::EncodingError| CanvasError::encode("iterm2", e);
    let mut bytes = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut bytes, width, height);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_palette(plte);
        if has_transparent {
            let mut trns = vec![255u8; entries];
            trns[usize::from(TRANSPARENT_INDEX)] = 0;
            encoder.set_trns(trns);
        }
        let mut writer = encoder.write_header().map_err(fail)?;
        writer.write_image_data(indices).map_err(fail)?;
        writer.finish().map_err(fail)?;
    }
    Ok(bytes)
}

/// Wrap PNG bytes in the inline-image escape sequence
pub fn build_iterm2_sequence(png: &[u8], cols: u16, rows: u16) -> String {
    format!(
        "\x1b]1337;File=inline=1;size={};width={};height={};preserveAspectRatio=0:{}\x07",
        png.len(),
        cols,
        rows,
        BASE64.encode(png)
    )
}

impl Rasterizer for ITerm2Rasterizer {
    fn rasterize(&mut self, frame: &FrameView<'_>, area: Rect, _buf: &mut Buffer, _inherited: Style) -> RasterOutput {
        let bounds = match raster_bounds(frame, area) {
            Ok(b) => b,
            Err(reason) => return RasterOutput::Skipped(reason),
        };
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

        match encode_indexed_png(&self.indices, frame.width, frame.height, palette) {
            Ok(png) => {
                debug!("iTerm2 payload: {} byte PNG, {} colors", png.len(), palette.len());
                RasterOutput::Payload(RasterPayload {
                    protocol: RasterProtocol::ITerm2,
                    data: build_iterm2_sequence(&png, bounds.width, bounds.height),
                    bounds,
                })
            }
            Err(e) => {
                warn!("Dropping iTerm2 frame: {}", e);
                RasterOutput::Skipped(SkipReason::EncodeFailed)
            }
        }
    }

    fn name(&self) -> &'static str {
        "ITerm2"
    }

    fn invalidate(&mut self) {
        self.palette.invalidate();
        self.indices = Vec::new();
    }

    fn has_valid_cache(&self) -> bool {
        self.palette.is_valid()
    }
}
