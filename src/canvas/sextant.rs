//! Sextant rasterizer - 2x3 sub-pixels per cell
//!
//! Uses the Unicode 13 "Symbols for Legacy Computing" sextant block
//! (U+1FB00..U+1FB3B) plus the four patterns that already existed as
//! classic block elements: space, left half, right half and full block.
//!
//! Pattern bits: 0 = top-left, 1 = top-right, 2 = middle-left,
//! 3 = middle-right, 4 = bottom-left, 5 = bottom-right.

use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;

use super::buffer::Layer;
use super::color::{unpack_rgba, Color, TRANSPARENT};
use super::quantize::{mean_color, quantize_block};
use super::rasterizer::{FrameView, RasterOutput, Rasterizer};

const LEFT_HALF: u8 = 0b01_0101;
const RIGHT_HALF: u8 = 0b10_1010;
const FULL: u8 = 0b11_1111;

const fn build_table() -> [char; 64] {
    let mut table = [' '; 64];
    let mut p: u32 = 1;
    while p < 63 {
        table[p as usize] = if p == LEFT_HALF as u32 {
            '▌'
        } else if p == RIGHT_HALF as u32 {
            '▐'
        } else {
            let offset = p - 1 - (p > LEFT_HALF as u32) as u32 - (p > RIGHT_HALF as u32) as u32;
            match char::from_u32(0x1FB00 + offset) {
                Some(c) => c,
                None => '?',
            }
        };
        p += 1;
    }
    table[FULL as usize] = '█';
    table
}

/// Glyph for every 6-bit pattern
pub const SEXTANT_TABLE: [char; 64] = build_table();

/// Glyph for a 6-bit pattern (higher bits ignored)
#[inline]
pub fn sextant_char(mask: u8) -> char {
    SEXTANT_TABLE[(mask & FULL) as usize]
}

/// Inverse of [`sextant_char`]
pub fn sextant_mask(ch: char) -> Option<u8> {
    match ch {
        ' ' => Some(0),
        '▌' => Some(LEFT_HALF),
        '▐' => Some(RIGHT_HALF),
        '█' => Some(FULL),
        _ => {
            let offset = (ch as u32).checked_sub(0x1FB00)?;
            if offset > 0x3B {
                return None;
            }
            let mut p = offset + 1;
            if p >= u32::from(LEFT_HALF) {
                p += 1;
            }
            if p >= u32::from(RIGHT_HALF) {
                p += 1;
            }
            Some(p as u8)
        }
    }
}

/// Sextant-character rasterizer
#[derive(Debug)]
pub struct SextantRasterizer {
    samples: [u32; 6],
    layers: [Layer; 6],
}

impl Default for SextantRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SextantRasterizer {
    pub fn new() -> Self {
        Self {
            samples: [TRANSPARENT; 6],
            layers: [Layer::Empty; 6],
        }
    }

    /// Drawing-layer pixels over image-layer pixels, when both are present
    fn layered_split(&self) -> Option<(u8, Color, Color)> {
        let mut mask = 0u8;
        let mut fg = [0u32; 4];
        let mut bg = [0u32; 4];
        for (i, (&px, layer)) in self.samples.iter().zip(&self.layers).enumerate() {
            let (r, g, b, _) = unpack_rgba(px);
            let acc = match layer {
                Layer::Drawing => {
                    mask |= 1 << i;
                    &mut fg
                }
                Layer::Image => &mut bg,
                Layer::Empty => return None,
            };
            acc[0] += u32::from(r);
            acc[1] += u32::from(g);
            acc[2] += u32::from(b);
            acc[3] += 1;
        }
        if fg[3] == 0 || bg[3] == 0 {
            return None;
        }
        let mean = |a: [u32; 4]| Color::rgb((a[0] / a[3]) as u8, (a[1] / a[3]) as u8, (a[2] / a[3]) as u8);
        let (fg, bg) = (mean(fg), mean(bg));
        (fg != bg).then_some((mask, fg, bg))
    }
}

impl Rasterizer for SextantRasterizer {
    fn rasterize(&mut self, frame: &FrameView<'_>, area: Rect, buf: &mut Buffer, inherited: Style) -> RasterOutput {
        let mut written = 0;
        for (cx, cy, pos) in frame.visible_cells(area, buf.area) {
            frame.sample_cell(cx, cy, &mut self.samples, &mut self.layers);

            let valid = self
                .samples
                .iter()
                .enumerate()
                .filter(|(_, &px)| px != TRANSPARENT)
                .fold(0u8, |m, (i, _)| m | (1 << i));
            if valid == 0 {
                continue;
            }
            let Some(cell) = buf.cell_mut(pos) else { continue };

            if valid != FULL {
                // holes show the inherited background
                let Some(fg) = mean_color(&self.samples) else { continue };
                cell.set_style(inherited);
                cell.set_char(sextant_char(valid)).set_fg(fg.to_ratatui());
                written += 1;
                continue;
            }

            let (mask, fg, bg) = match self.layered_split() {
                Some(split) => split,
                None => match quantize_block(&self.samples) {
                    Some(q) => (q.mask, q.fg, q.bg),
                    None => continue,
                },
            };
            cell.set_style(inherited);
            cell.set_char(sextant_char(mask))
                .set_fg(fg.to_ratatui())
                .set_bg(bg.to_ratatui());
            written += 1;
        }
        RasterOutput::Cells(written)
    }

    fn name(&self) -> &'static str {
        "Sextant"
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use ratatui::style::Color as TuiColor;

    use super::*;
    use crate::canvas::rasterizer::CellGeometry;

    #[test]
    fn test_table_anchors() {
        assert_eq!(sextant_char(0), ' ');
        assert_eq!(sextant_char(1), '\u{1FB00}');
        assert_eq!(sextant_char(LEFT_HALF), '▌');
        assert_eq!(sextant_char(RIGHT_HALF), '▐');
        assert_eq!(sextant_char(62), '\u{1FB3B}');
        assert_eq!(sextant_char(FULL), '█');
    }

    #[test]
    fn test_table_is_bijection() {
        let unique: HashSet<char> = SEXTANT_TABLE.iter().copied().collect();
        assert_eq!(unique.len(), 64);
        for mask in 0..64u8 {
            assert_eq!(sextant_mask(sextant_char(mask)), Some(mask), "mask {mask}");
        }
        assert_eq!(sextant_mask('x'), None);
        assert_eq!(sextant_mask('\u{1FB3C}'), None);
    }

    fn render(pixels: &[u32], drawing: &[u32], w: u32, h: u32) -> Buffer {
        let area = Rect::new(0, 0, (w / 2) as u16, (h / 3) as u16);
        let mut buf = Buffer::empty(area);
        let frame = FrameView {
            pixels,
            drawing,
            width: w,
            height: h,
            geometry: CellGeometry::character(1),
            source_id: 0,
            dynamic: false,
            clip: area,
        };
        let out = SextantRasterizer::new().rasterize(&frame, area, &mut buf, Style::default());
        assert!(matches!(out, RasterOutput::Cells(_)));
        buf
    }

    #[test]
    fn test_layered_fast_path_puts_drawing_in_front() {
        let red = Color::RED.pack();
        let blue = Color::BLUE.pack();
        // top row drawn, rest from the image
        let pixels = [red, red, blue, blue, blue, blue];
        let drawing = [red, red, 0, 0, 0, 0];
        let buf = render(&pixels, &drawing, 2, 3);
        let cell = &buf[(0, 0)];
        assert_eq!(cell.symbol(), sextant_char(0b11).to_string());
        assert_eq!(cell.fg, TuiColor::Rgb(255, 0, 0));
        assert_eq!(cell.bg, TuiColor::Rgb(0, 0, 255));
    }

    #[test]
    fn test_partial_transparency_keeps_inherited_bg() {
        let white = Color::WHITE.pack();
        let pixels = [white, 0, white, 0, white, 0];
        let buf = render(&pixels, &pixels, 2, 3);
        let cell = &buf[(0, 0)];
        assert_eq!(cell.symbol(), "▌");
        assert_eq!(cell.fg, TuiColor::Rgb(255, 255, 255));
        assert_eq!(cell.bg, TuiColor::Reset);
    }

    #[test]
    fn test_partial_cell_uses_visible_color() {
        let green = Color::GREEN.pack();
        let pixels = [0, green, 0, green, 0, green];
        let buf = render(&pixels, &pixels, 2, 3);
        let cell = &buf[(0, 0)];
        assert_eq!(cell.symbol(), "▐");
        assert_eq!(cell.fg, TuiColor::Rgb(0, 255, 0));
    }

    #[test]
    fn test_empty_cell_untouched() {
        let buf = render(&[0; 6], &[0; 6], 2, 3);
        assert_eq!(buf[(0, 0)].symbol(), " ");
        assert_eq!(buf[(0, 0)].fg, TuiColor::Reset);
    }
}
