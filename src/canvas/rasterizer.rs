//! Rasterizer trait for converting the composited buffer to terminal output

use std::io::Write;

use crossterm::{cursor::MoveTo, style::Print, QueueableCommand};
use ratatui::buffer::Buffer;
use ratatui::layout::{Position, Rect};
use ratatui::style::Style;

use super::buffer::Layer;
use super::caps::RasterProtocol;
use super::color::TRANSPARENT;
use crate::errors::Result;

/// Pixels covered by one terminal cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellGeometry {
    pub cell_width: u32,
    pub cell_height: u32,
}

impl CellGeometry {
    /// 2x3 sub-cells, each `scale` pixels square
    pub fn character(scale: u32) -> Self {
        let scale = scale.max(1);
        Self {
            cell_width: 2 * scale,
            cell_height: 3 * scale,
        }
    }

    /// Native terminal pixels per cell
    pub fn raster(cell_width: u32, cell_height: u32) -> Self {
        Self {
            cell_width: cell_width.max(1),
            cell_height: cell_height.max(1),
        }
    }
}

/// Read-only view of one frame handed to a rasterizer
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    /// Composited (possibly dithered) packed pixels
    pub pixels: &'a [u32],
    /// Drawing layer, used to tell which layer a pixel came from
    pub drawing: &'a [u32],
    pub width: u32,
    pub height: u32,
    pub geometry: CellGeometry,
    /// Changes whenever the composite content changes
    pub source_id: u64,
    /// Animated content (shader or paint callback)
    pub dynamic: bool,
    /// Visible region; raster payloads that don't fit are skipped
    pub clip: Rect,
}

impl FrameView<'_> {
    /// Whole cells covered by the buffer
    pub fn cells(&self) -> (u32, u32) {
        (
            self.width / self.geometry.cell_width,
            self.height / self.geometry.cell_height,
        )
    }

    #[inline]
    pub fn layer_at(&self, idx: usize) -> Layer {
        if self.drawing.get(idx).is_some_and(|&p| p != TRANSPARENT) {
            Layer::Drawing
        } else if self.pixels.get(idx).is_some_and(|&p| p != TRANSPARENT) {
            Layer::Image
        } else {
            Layer::Empty
        }
    }

    /// Sample the 2x3 sub-pixels of cell `(cx, cy)` in row-major order
    pub fn sample_cell(&self, cx: u32, cy: u32, samples: &mut [u32; 6], layers: &mut [Layer; 6]) {
        let sub_w = (self.geometry.cell_width / 2).max(1);
        let sub_h = (self.geometry.cell_height / 3).max(1);
        let x0 = cx * self.geometry.cell_width;
        let y0 = cy * self.geometry.cell_height;
        for i in 0..6u32 {
            let x = x0 + (i % 2) * sub_w + sub_w / 2;
            let y = y0 + (i / 2) * sub_h + sub_h / 2;
            let (px, layer) = if x < self.width && y < self.height {
                let idx = (y * self.width + x) as usize;
                (self.pixels[idx], self.layer_at(idx))
            } else {
                (TRANSPARENT, Layer::Empty)
            };
            samples[i as usize] = px;
            layers[i as usize] = layer;
        }
    }

    /// Cells of `area` that are backed by pixels and lie inside `buf_area` and the clip
    pub fn visible_cells(&self, area: Rect, buf_area: Rect) -> impl Iterator<Item = (u32, u32, Position)> {
        let (cols, rows) = self.cells();
        let target = area.intersection(buf_area).intersection(self.clip);
        let (ax, ay) = (area.x, area.y);
        let x_range = target.left()..target.right();
        (target.top()..target.bottom())
            .flat_map(move |y| x_range.clone().map(move |x| (x, y)))
            .filter_map(move |(x, y)| {
                let cx = u32::from(x - ax);
                let cy = u32::from(y - ay);
                (cx < cols && cy < rows).then_some((cx, cy, Position::new(x, y)))
            })
    }
}

/// Why a rasterizer produced nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The payload would extend past the visible region
    OutsideClip,
    /// The terminal does not (or no longer) support the protocol
    Unsupported,
    /// Nothing to draw
    Empty,
    /// Encoding failed; details were logged
    EncodeFailed,
}

/// Protocol bytes plus where to place them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterPayload {
    pub protocol: RasterProtocol,
    pub data: String,
    pub bounds: Rect,
}

impl RasterPayload {
    /// Move the cursor to the payload origin and emit it
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        out.queue(MoveTo(self.bounds.x, self.bounds.y))?;
        out.queue(Print(&self.data))?;
        out.flush()?;
        Ok(())
    }
}

/// Output from rasterizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RasterOutput {
    /// Number of styled cells written into the buffer
    Cells(usize),
    /// Raw escape sequence to emit after the cell grid is flushed
    Payload(RasterPayload),
    Skipped(SkipReason),
}

impl RasterOutput {
    pub fn payload(&self) -> Option<&RasterPayload> {
        match self {
            RasterOutput::Payload(p) => Some(p),
            _ => None,
        }
    }
}

/// Trait for rasterizers that convert the buffer to terminal output
pub trait Rasterizer: Send {
    /// Convert one frame, writing cells into `buf` or returning a payload
    fn rasterize(&mut self, frame: &FrameView<'_>, area: Rect, buf: &mut Buffer, inherited: Style) -> RasterOutput;

    /// Name of this rasterizer
    fn name(&self) -> &'static str;

    /// Drop derived caches (resize)
    fn invalidate(&mut self) {}

    /// Whether a derived cache currently holds data
    fn has_valid_cache(&self) -> bool {
        false
    }
}

/// Build the rasterizer for a gfx mode
pub fn select_rasterizer(mode: &crate::config::GfxMode) -> Box<dyn Rasterizer> {
    use super::ascii::{AsciiLumaRasterizer, AsciiPatternRasterizer};
    use super::block::BlockRasterizer;
    use super::iterm2::ITerm2Rasterizer;
    use super::kitty::KittyRasterizer;
    use super::sextant::SextantRasterizer;
    use super::sixel::SixelRasterizer;
    use crate::config::{CharacterStyle, GfxMode};

    match mode {
        GfxMode::Character { style, .. } => match style {
            CharacterStyle::Sextant => Box::new(SextantRasterizer::new()),
            CharacterStyle::Block => Box::new(BlockRasterizer::new()),
            CharacterStyle::Pattern => Box::new(AsciiPatternRasterizer::new()),
            CharacterStyle::Luma => Box::new(AsciiLumaRasterizer::new()),
        },
        GfxMode::Raster { protocol } => match protocol {
            RasterProtocol::Sixel => Box::new(SixelRasterizer::new()),
            RasterProtocol::Kitty => Box::new(KittyRasterizer::new()),
            RasterProtocol::ITerm2 => Box::new(ITerm2Rasterizer::new()),
        },
    }
}

/// Whole-canvas placement for raster payloads, or the reason to skip
pub fn raster_bounds(frame: &FrameView<'_>, area: Rect) -> std::result::Result<Rect, SkipReason> {
    let (cols, rows) = frame.cells();
    if cols == 0 || rows == 0 {
        return Err(SkipReason::Empty);
    }
    let bounds = Rect::new(
        area.x,
        area.y,
        u16::try_from(cols).unwrap_or(u16::MAX),
        u16::try_from(rows).unwrap_or(u16::MAX),
    );
    let clipped = bounds.intersection(frame.clip);
    if clipped != bounds {
        return Err(SkipReason::OutsideClip);
    }
    Ok(bounds)
}
