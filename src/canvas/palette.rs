//! Palettes for the raster protocols
//!
//! Sixel, Kitty and iTerm2 payloads are built from palette indices. A
//! palette is a median cut over a 5-bit-per-channel histogram; lookups are
//! memoized per 5-bit color so indexing a frame costs one table hit per pixel.

use tracing::debug;

use super::color::{luma, unpack_rgba, TRANSPARENT};

/// Index reserved for transparent pixels
pub const TRANSPARENT_INDEX: u8 = 255;

/// Largest palette; one slot stays free for [`TRANSPARENT_INDEX`]
pub const MAX_COLORS: usize = 255;

const BINS: usize = 1 << 15;
const UNSET: u8 = u8::MAX;

#[inline]
fn bin_of(r: u8, g: u8, b: u8) -> usize {
    (usize::from(r >> 3) << 10) | (usize::from(g >> 3) << 5) | usize::from(b >> 3)
}

#[inline]
fn bin_center(bin: usize) -> [u8; 3] {
    [
        (((bin >> 10) & 31) << 3 | 4) as u8,
        (((bin >> 5) & 31) << 3 | 4) as u8,
        ((bin & 31) << 3 | 4) as u8,
    ]
}

#[derive(Debug, Clone, Copy)]
struct Bin {
    key: usize,
    count: u32,
    sum: [u64; 3],
}

/// Indexed color table
#[derive(Debug, Clone)]
pub struct Palette {
    colors: Vec<[u8; 3]>,
    lookup: Vec<u8>,
    luma_min: u32,
    luma_max: u32,
}

impl Palette {
    /// Build from explicit colors (at most [`MAX_COLORS`])
    pub fn from_colors(mut colors: Vec<[u8; 3]>) -> Self {
        if colors.is_empty() {
            colors.push([0, 0, 0]);
        }
        colors.truncate(MAX_COLORS);
        let lumas = colors.iter().map(|c| luma(c[0], c[1], c[2]));
        let luma_min = lumas.clone().min().unwrap_or(0);
        let luma_max = lumas.max().unwrap_or(0);
        Self {
            colors,
            lookup: vec![UNSET; BINS],
            luma_min,
            luma_max,
        }
    }

    /// Median-cut palette of at most `max_colors` entries for the visible pixels
    pub fn median_cut(pixels: &[u32], max_colors: usize) -> Self {
        let max_colors = max_colors.clamp(1, MAX_COLORS);
        let mut hist = vec![(0u32, [0u64; 3]); BINS];
        for &px in pixels {
            if px == TRANSPARENT {
                continue;
            }
            let (r, g, b, _) = unpack_rgba(px);
            let slot = &mut hist[bin_of(r, g, b)];
            slot.0 += 1;
            slot.1[0] += u64::from(r);
            slot.1[1] += u64::from(g);
            slot.1[2] += u64::from(b);
        }
        let bins: Vec<Bin> = hist
            .iter()
            .enumerate()
            .filter(|(_, (count, _))| *count > 0)
            .map(|(key, &(count, sum))| Bin { key, count, sum })
            .collect();

        let mut boxes: Vec<Vec<Bin>> = if bins.is_empty() { Vec::new() } else { vec![bins] };
        while boxes.len() < max_colors {
            let Some((idx, channel)) = widest_box(&boxes) else { break };
            let mut target = boxes.swap_remove(idx);
            target.sort_unstable_by_key(|b| bin_center(b.key)[channel]);
            let total: u64 = target.iter().map(|b| u64::from(b.count)).sum();
            let mut acc = 0u64;
            let mut cut = 1;
            for (i, b) in target.iter().enumerate() {
                acc += u64::from(b.count);
                if acc * 2 >= total {
                    cut = (i + 1).clamp(1, target.len() - 1);
                    break;
                }
            }
            let upper = target.split_off(cut);
            boxes.push(target);
            boxes.push(upper);
        }

        let colors = boxes
            .iter()
            .map(|bx| {
                let n: u64 = bx.iter().map(|b| u64::from(b.count)).sum::<u64>().max(1);
                let mut sum = [0u64; 3];
                for b in bx {
                    for c in 0..3 {
                        sum[c] += b.sum[c];
                    }
                }
                [(sum[0] / n) as u8, (sum[1] / n) as u8, (sum[2] / n) as u8]
            })
            .collect();
        Self::from_colors(colors)
    }

    pub fn colors(&self) -> &[[u8; 3]] {
        &self.colors
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Darkest and brightest palette luma
    pub fn luma_range(&self) -> (u32, u32) {
        (self.luma_min, self.luma_max)
    }

    /// Nearest palette entry, memoized per 5-bit color
    pub fn nearest(&mut self, r: u8, g: u8, b: u8) -> u8 {
        let key = bin_of(r, g, b);
        let cached = self.lookup[key];
        if cached != UNSET {
            return cached;
        }
        let [cr, cg, cb] = bin_center(key);
        let mut best = 0usize;
        let mut best_d = u32::MAX;
        for (i, c) in self.colors.iter().enumerate() {
            let dr = i32::from(c[0]) - i32::from(cr);
            let dg = i32::from(c[1]) - i32::from(cg);
            let db = i32::from(c[2]) - i32::from(cb);
            let d = (dr * dr + dg * dg + db * db) as u32;
            if d < best_d {
                best = i;
                best_d = d;
            }
        }
        let idx = best as u8;
        self.lookup[key] = idx;
        idx
    }

    /// Index every pixel; returns the mean per-channel error in `[0, 1]`
    pub fn index_frame(&mut self, pixels: &[u32], out: &mut Vec<u8>) -> f64 {
        out.clear();
        out.reserve(pixels.len());
        let mut error = 0u64;
        let mut visible = 0u64;
        for &px in pixels {
            if px == TRANSPARENT {
                out.push(TRANSPARENT_INDEX);
                continue;
            }
            let (r, g, b, _) = unpack_rgba(px);
            let idx = self.nearest(r, g, b);
            let c = self.colors[idx as usize];
            error += u64::from(r.abs_diff(c[0])) + u64::from(g.abs_diff(c[1])) + u64::from(b.abs_diff(c[2]));
            visible += 1;
            out.push(idx);
        }
        if visible == 0 {
            return 0.0;
        }
        error as f64 / (visible as f64 * 3.0 * 255.0)
    }

    /// RGB of an index; transparent maps to black
    pub fn rgb(&self, index: u8) -> [u8; 3] {
        self.colors.get(index as usize).copied().unwrap_or([0, 0, 0])
    }
}

/// Box with the largest channel spread among those that can still be split
fn widest_box(boxes: &[Vec<Bin>]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize, u8)> = None;
    for (i, bx) in boxes.iter().enumerate() {
        if bx.len() < 2 {
            continue;
        }
        for channel in 0..3 {
            let (lo, hi) = bx.iter().fold((u8::MAX, 0u8), |(lo, hi), b| {
                let v = bin_center(b.key)[channel];
                (lo.min(v), hi.max(v))
            });
            let spread = hi - lo;
            let wider = match best {
                Some((_, _, s)) => spread > s,
                None => true,
            };
            if wider {
                best = Some((i, channel, spread));
            }
        }
    }
    best.map(|(i, channel, _)| (i, channel))
}

/// Palette lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaletteMode {
    /// Compute once per key; for static content
    #[default]
    Cached,
    /// Reuse across frames until the error tolerance is exceeded
    Keyframe,
}

/// When a keyframe palette is rebuilt
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyframeTolerance {
    /// Mean per-channel error, as a fraction of full scale
    pub color_error: f64,
    /// How far frame luma may exceed the palette's luma range, as a fraction of 255
    pub luma_gap: f64,
}

impl Default for KeyframeTolerance {
    fn default() -> Self {
        Self {
            color_error: 0.02,
            luma_gap: 0.02,
        }
    }
}

/// Identity of the content a palette was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PaletteKey {
    pub source: u64,
    pub width: u32,
    pub height: u32,
}

/// Per-encoder palette memo
#[derive(Debug, Default)]
pub struct PaletteCache {
    tolerance: KeyframeTolerance,
    key: Option<PaletteKey>,
    palette: Option<Palette>,
    rebuilds: u64,
}

impl PaletteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tolerance(tolerance: KeyframeTolerance) -> Self {
        Self {
            tolerance,
            ..Self::default()
        }
    }

    pub fn tolerance(&self) -> KeyframeTolerance {
        self.tolerance
    }

    pub fn set_tolerance(&mut self, tolerance: KeyframeTolerance) {
        self.tolerance = tolerance;
    }

    pub fn is_valid(&self) -> bool {
        self.palette.is_some()
    }

    pub fn invalidate(&mut self) {
        self.key = None;
        self.palette = None;
    }

    /// Palette builds since creation
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    fn rebuild(&mut self, key: PaletteKey, pixels: &[u32]) -> &mut Palette {
        self.rebuilds += 1;
        self.key = Some(key);
        debug!(
            "Rebuilding palette for {}x{} (source {})",
            key.width, key.height, key.source
        );
        self.palette.insert(Palette::median_cut(pixels, MAX_COLORS))
    }

    fn luma_gap_exceeded(&self, palette: &Palette, pixels: &[u32]) -> bool {
        let (lo, hi) = pixels
            .iter()
            .filter(|&&px| px != TRANSPARENT)
            .fold((u32::MAX, 0u32), |(lo, hi), &px| {
                let (r, g, b, _) = unpack_rgba(px);
                let l = luma(r, g, b);
                (lo.min(l), hi.max(l))
            });
        if lo > hi {
            return false;
        }
        let slack = (self.tolerance.luma_gap * 255.0).round() as u32;
        let (p_lo, p_hi) = palette.luma_range();
        lo + slack < p_lo || hi > p_hi + slack
    }

    /// Index `pixels` into `out`, rebuilding the palette as the mode requires
    pub fn index(&mut self, mode: PaletteMode, key: PaletteKey, pixels: &[u32], out: &mut Vec<u8>) -> &Palette {
        let reusable = match (&self.palette, self.key) {
            (Some(_), Some(k)) if mode == PaletteMode::Cached => k == key,
            (Some(_), Some(k)) => k.width == key.width && k.height == key.height,
            _ => false,
        };

        if !reusable {
            self.rebuild(key, pixels).index_frame(pixels, out);
        } else if mode == PaletteMode::Keyframe {
            let gap = self.palette.as_ref().is_some_and(|p| self.luma_gap_exceeded(p, pixels));
            let error = match (gap, self.palette.as_mut()) {
                (false, Some(p)) => p.index_frame(pixels, out),
                _ => f64::INFINITY,
            };
            if error > self.tolerance.color_error {
                self.rebuild(key, pixels).index_frame(pixels, out);
            } else {
                self.key = Some(key);
            }
        } else if let Some(p) = self.palette.as_mut() {
            p.index_frame(pixels, out);
        }

        self.palette
            .get_or_insert_with(|| Palette::median_cut(pixels, MAX_COLORS))
    }
}
