//! Sixel rasterizer
//!
//! The canvas is indexed against a palette and written as bands of six
//! pixel rows. Each band emits one pass per color it uses (`#n` select,
//! sixel data, `$` return) and bands are separated by `-`.
//!
//! Frame: `DCS 0;1;0 q "1;1;w;h` ... `ST`. P2 = 1 leaves unset pixels
//! transparent.

use std::fmt::Write as _;

use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;
use tracing::debug;

use super::caps::RasterProtocol;
use super::palette::{Palette, PaletteCache, PaletteKey, PaletteMode, TRANSPARENT_INDEX};
use super::rasterizer::{raster_bounds, FrameView, RasterOutput, RasterPayload, Rasterizer};

const RLE_MIN: usize = 4;

/// Sixel graphics rasterizer
#[derive(Debug, Default)]
pub struct SixelRasterizer {
    palette: PaletteCache,
    indices: Vec<u8>,
}

impl SixelRasterizer {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Percent channel value used by sixel color registers
#[inline]
fn percent(v: u8) -> u32 {
    (u32::from(v) * 100 + 127) / 255
}

fn push_run(out: &mut String, ch: char, count: usize) {
    if count >= RLE_MIN {
        let _ = write!(out, "!{count}{ch}");
    } else {
        for _ in 0..count {
            out.push(ch);
        }
    }
}

/// Serialize palette indices as a complete sixel image
pub fn encode_sixel(indices: &[u8], width: u32, height: u32, palette: &Palette) -> String {
    let w = width as usize;
    let h = height as usize;
    let mut out = String::with_capacity(w * h / 2 + 64);

    out.push_str("\x1bP0;1;0q");
    let _ = write!(out, "\"1;1;{width};{height}");
    for (i, c) in palette.colors().iter().enumerate() {
        let _ = write!(out, "#{};2;{};{};{}", i, percent(c[0]), percent(c[1]), percent(c[2]));
    }

    let mut used = vec![false; palette.len()];
    let mut band = 0;
    while band * 6 < h {
        let y0 = band * 6;
        let rows = (h - y0).min(6);

        used.iter_mut().for_each(|u| *u = false);
        for y in y0..y0 + rows {
            for &idx in &indices[y * w..(y + 1) * w] {
                if idx != TRANSPARENT_INDEX {
                    if let Some(u) = used.get_mut(idx as usize) {
                        *u = true;
                    }
                }
            }
        }

        let mut first = true;
        for color in (0..palette.len()).filter(|&c| used[c]) {
            if !first {
                out.push('$');
            }
            first = false;
            let _ = write!(out, "#{color}");

            let mut run_char = '?';
            let mut run_len = 0usize;
            for x in 0..w {
                let mut bits = 0u8;
                for dy in 0..rows {
                    if indices[(y0 + dy) * w + x] as usize == color {
                        bits |= 1 << dy;
                    }
                }
                let ch = char::from(63 + bits);
                if ch == run_char {
                    run_len += 1;
                } else {
                    push_run(&mut out, run_char, run_len);
                    run_char = ch;
                    run_len = 1;
                }
            }
            push_run(&mut out, run_char, run_len);
        }

        band += 1;
        if band * 6 < h {
            out.push('-');
        }
    }

    out.push_str("\x1b\\");
    out
}

impl Rasterizer for SixelRasterizer {
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
        let data = encode_sixel(&self.indices, frame.width, frame.height, palette);
        debug!("Sixel payload: {} bytes, {} colors", data.len(), palette.len());

        RasterOutput::Payload(RasterPayload {
            protocol: RasterProtocol::Sixel,
            data,
            bounds,
        })
    }

    fn name(&self) -> &'static str {
        "Sixel"
    }

    fn invalidate(&mut self) {
        self.palette.invalidate();
        self.indices = Vec::new();
    }

    fn has_valid_cache(&self) -> bool {
        self.palette.is_valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::color::Color;
    use crate::canvas::rasterizer::CellGeometry;

    #[test]
    fn test_single_color_band_uses_rle() {
        let palette = Palette::from_colors(vec![[255, 0, 0]]);
        let indices = vec![0u8; 8 * 6];
        let out = encode_sixel(&indices, 8, 6, &palette);
        assert!(out.starts_with("\x1bP0;1;0q\"1;1;8;6#0;2;100;0;0"));
        // six rows all set = '~', eight columns
        assert!(out.contains("#0!8~"));
        assert!(out.ends_with("\x1b\\"));
        assert!(!out.contains('-'));
    }

    #[test]
    fn test_bands_and_short_runs() {
        let palette = Palette::from_colors(vec![[0, 0, 0], [255, 255, 255]]);
        // 2x7: first band row 0 is white, second band is one black row
        let mut indices = vec![TRANSPARENT_INDEX; 2 * 7];
        indices[0] = 1;
        indices[1] = 1;
        indices[12] = 0;
        indices[13] = 0;
        let out = encode_sixel(&indices, 2, 7, &palette);
        assert!(out.contains("#1@@-#0@@"));
    }

    #[test]
    fn test_two_colors_in_one_band() {
        let palette = Palette::from_colors(vec![[0, 0, 0], [255, 255, 255]]);
        let indices = vec![0, 1];
        let out = encode_sixel(&indices, 2, 1, &palette);
        assert!(out.contains("#0@?$#1?@"));
    }

    #[test]
    fn test_rasterize_skips_outside_clip() {
        let pixels = vec![Color::RED.pack(); 16 * 32];
        let frame = FrameView {
            pixels: &pixels,
            drawing: &pixels,
            width: 16,
            height: 32,
            geometry: CellGeometry::raster(8, 16),
            source_id: 1,
            dynamic: false,
            clip: Rect::new(0, 0, 1, 1),
        };
        let area = Rect::new(0, 0, 2, 2);
        let mut buf = Buffer::empty(area);
        let mut sixel = SixelRasterizer::new();
        let out = sixel.rasterize(&frame, area, &mut buf, Style::default());
        assert!(matches!(out, RasterOutput::Skipped(_)));
        assert!(!sixel.has_valid_cache());

        let frame = FrameView {
            clip: area,
            ..frame
        };
        let out = sixel.rasterize(&frame, area, &mut buf, Style::default());
        let payload = out.payload().unwrap();
        assert_eq!(payload.bounds, area);
        assert!(payload.data.contains("\"1;1;16;32"));
        assert!(sixel.has_valid_cache());
    }
}
