//! Solid-block rasterizer
//!
//! Each terminal cell becomes one space whose background is the mean color
//! of the cell's 2x3 samples. No character-level detail, but every terminal
//! with color support renders it.

use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;

use super::buffer::Layer;
use super::color::TRANSPARENT;
use super::quantize::mean_color;
use super::rasterizer::{FrameView, RasterOutput, Rasterizer};

/// Averaged-color block rasterizer
#[derive(Debug)]
pub struct BlockRasterizer {
    samples: [u32; 6],
    layers: [Layer; 6],
}

impl Default for BlockRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockRasterizer {
    pub fn new() -> Self {
        Self {
            samples: [TRANSPARENT; 6],
            layers: [Layer::Empty; 6],
        }
    }
}

impl Rasterizer for BlockRasterizer {
    fn rasterize(&mut self, frame: &FrameView<'_>, area: Rect, buf: &mut Buffer, inherited: Style) -> RasterOutput {
        let mut written = 0;
        for (cx, cy, pos) in frame.visible_cells(area, buf.area) {
            frame.sample_cell(cx, cy, &mut self.samples, &mut self.layers);
            let Some(avg) = mean_color(&self.samples) else { continue };
            let Some(cell) = buf.cell_mut(pos) else { continue };
            cell.set_style(inherited);
            cell.set_char(' ').set_bg(avg.to_ratatui());
            written += 1;
        }
        RasterOutput::Cells(written)
    }

    fn name(&self) -> &'static str {
        "Block"
    }
}
