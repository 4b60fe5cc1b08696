//! ASCII rasterizers
//!
//! Two flavors for terminals or fonts without the sextant block:
//! - pattern: the 2x3 on/off split picks a glyph whose shape resembles it
//! - luma: the cell's mean brightness indexes a density ramp

use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;

use super::buffer::Layer;
use super::color::TRANSPARENT;
use super::quantize::{mean_color, mean_luma, quantize_block};
use super::rasterizer::{FrameView, RasterOutput, Rasterizer};

/// Sparse to dense
pub const LUMA_RAMP: &[u8] = b" .:-=+*#%@";

/// ASCII glyph for each 6-bit sub-cell pattern (same bit layout as sextants)
pub const PATTERN_TABLE: &[u8; 64] =
    b" `'\"-(/F-\\)7-LJ=,!/r([+E/++%L*YP.\\!7\\++%)+]3JY*q_LJ=L*%WJ%*M=bd#";

#[inline]
pub fn pattern_char(mask: u8) -> char {
    char::from(PATTERN_TABLE[(mask & 0x3F) as usize])
}

/// Ramp glyph for a luma in `0..=255`
#[inline]
pub fn luma_char(luma: u32) -> char {
    let idx = (luma.min(255) as usize * LUMA_RAMP.len()) / 256;
    char::from(LUMA_RAMP[idx])
}

fn valid_mask(samples: &[u32; 6]) -> u8 {
    samples
        .iter()
        .enumerate()
        .filter(|(_, &px)| px != TRANSPARENT)
        .fold(0u8, |m, (i, _)| m | (1 << i))
}

/// Shape-matching ASCII rasterizer
#[derive(Debug)]
pub struct AsciiPatternRasterizer {
    samples: [u32; 6],
    layers: [Layer; 6],
}

impl Default for AsciiPatternRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl AsciiPatternRasterizer {
    pub fn new() -> Self {
        Self {
            samples: [TRANSPARENT; 6],
            layers: [Layer::Empty; 6],
        }
    }
}

impl Rasterizer for AsciiPatternRasterizer {
    fn rasterize(&mut self, frame: &FrameView<'_>, area: Rect, buf: &mut Buffer, inherited: Style) -> RasterOutput {
        let mut written = 0;
        for (cx, cy, pos) in frame.visible_cells(area, buf.area) {
            frame.sample_cell(cx, cy, &mut self.samples, &mut self.layers);
            let valid = valid_mask(&self.samples);
            if valid == 0 {
                continue;
            }
            let Some(cell) = buf.cell_mut(pos) else { continue };

            if valid != 0x3F {
                let Some(fg) = mean_color(&self.samples) else { continue };
                cell.set_style(inherited);
                cell.set_char(pattern_char(valid)).set_fg(fg.to_ratatui());
            } else if let Some(q) = quantize_block(&self.samples) {
                cell.set_style(inherited);
                cell.set_char(pattern_char(q.mask))
                    .set_fg(q.fg.to_ratatui())
                    .set_bg(q.bg.to_ratatui());
            }
            written += 1;
        }
        RasterOutput::Cells(written)
    }

    fn name(&self) -> &'static str {
        "AsciiPattern"
    }
}

/// Brightness-ramp ASCII rasterizer
#[derive(Debug)]
pub struct AsciiLumaRasterizer {
    samples: [u32; 6],
    layers: [Layer; 6],
}

impl Default for AsciiLumaRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl AsciiLumaRasterizer {
    pub fn new() -> Self {
        Self {
            samples: [TRANSPARENT; 6],
            layers: [Layer::Empty; 6],
        }
    }
}

impl Rasterizer for AsciiLumaRasterizer {
    fn rasterize(&mut self, frame: &FrameView<'_>, area: Rect, buf: &mut Buffer, inherited: Style) -> RasterOutput {
        let mut written = 0;
        for (cx, cy, pos) in frame.visible_cells(area, buf.area) {
            frame.sample_cell(cx, cy, &mut self.samples, &mut self.layers);
            let (Some(luma), Some(color)) = (mean_luma(&self.samples), mean_color(&self.samples)) else {
                continue;
            };
            let Some(cell) = buf.cell_mut(pos) else { continue };
            cell.set_style(inherited);
            cell.set_char(luma_char(luma)).set_fg(color.to_ratatui());
            written += 1;
        }
        RasterOutput::Cells(written)
    }

    fn name(&self) -> &'static str {
        "AsciiLuma"
    }
}
