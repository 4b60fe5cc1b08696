//! Color-depth reduction
//!
//! Every `apply_*` function mutates an RGBA byte slice in place, reducing the
//! three color channels to `2^bits` evenly spaced levels. Alpha is left alone
//! and fully transparent pixels neither receive nor spread error.
//!
//! Error diffusion (Floyd–Steinberg, Sierra, Atkinson) looks best on static
//! images. The threshold family (Bayer, blue noise, custom matrices) has no
//! directional state, so it stays stable from one animation frame to the next.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::buffer::PixelBuffer;
use super::color::luma;
use super::image::LoadedImage;

/// Row traversal for error diffusion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    /// Always left-to-right; identical input gives identical output every frame
    Stable,
    /// Alternate direction per row for smoother diffusion on still images
    Serpentine,
}

/// Selectable dithering algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DitherAlgorithm {
    FloydSteinberg,
    FloydSteinbergStable,
    Sierra,
    SierraStable,
    Atkinson,
    AtkinsonStable,
    Ordered,
    BlueNoise,
    Threshold,
}

impl DitherAlgorithm {
    pub const ALL: [DitherAlgorithm; 9] = [
        DitherAlgorithm::FloydSteinberg,
        DitherAlgorithm::FloydSteinbergStable,
        DitherAlgorithm::Sierra,
        DitherAlgorithm::SierraStable,
        DitherAlgorithm::Atkinson,
        DitherAlgorithm::AtkinsonStable,
        DitherAlgorithm::Ordered,
        DitherAlgorithm::BlueNoise,
        DitherAlgorithm::Threshold,
    ];

    /// Parse the option spelling (`floyd-steinberg`, `blue-noise`, ...)
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase().replace('_', "-");
        let algorithm = match name.as_str() {
            "floyd-steinberg" | "floydsteinberg" => DitherAlgorithm::FloydSteinberg,
            "floyd-steinberg-stable" => DitherAlgorithm::FloydSteinbergStable,
            "sierra" => DitherAlgorithm::Sierra,
            "sierra-stable" => DitherAlgorithm::SierraStable,
            "atkinson" => DitherAlgorithm::Atkinson,
            "atkinson-stable" => DitherAlgorithm::AtkinsonStable,
            "ordered" | "bayer" => DitherAlgorithm::Ordered,
            "blue-noise" | "bluenoise" => DitherAlgorithm::BlueNoise,
            "threshold" | "threshold-matrix" => DitherAlgorithm::Threshold,
            _ => return None,
        };
        Some(algorithm)
    }

    /// True for algorithms whose output never depends on scan direction
    pub fn is_frame_stable(self) -> bool {
        !matches!(
            self,
            DitherAlgorithm::FloydSteinberg | DitherAlgorithm::Sierra | DitherAlgorithm::Atkinson
        )
    }

    /// Run this algorithm; `Threshold` uses `matrix` and falls back to Bayer without one
    pub fn apply(
        self,
        data: &mut [u8],
        width: u32,
        height: u32,
        bits: u8,
        matrix: Option<&ThresholdMatrix>,
    ) {
        match self {
            DitherAlgorithm::FloydSteinberg => {
                apply_floyd_steinberg(data, width, height, bits, ScanOrder::Serpentine);
            }
            DitherAlgorithm::FloydSteinbergStable => {
                apply_floyd_steinberg(data, width, height, bits, ScanOrder::Stable);
            }
            DitherAlgorithm::Sierra => apply_sierra(data, width, height, bits, ScanOrder::Serpentine),
            DitherAlgorithm::SierraStable => {
                apply_sierra(data, width, height, bits, ScanOrder::Stable);
            }
            DitherAlgorithm::Atkinson => {
                apply_atkinson(data, width, height, bits, ScanOrder::Serpentine);
            }
            DitherAlgorithm::AtkinsonStable => {
                apply_atkinson(data, width, height, bits, ScanOrder::Stable);
            }
            DitherAlgorithm::Ordered => apply_ordered(data, width, height, bits),
            DitherAlgorithm::BlueNoise => apply_blue_noise(data, width, height, bits),
            DitherAlgorithm::Threshold => match matrix {
                Some(m) => apply_threshold_matrix(data, width, height, bits, m),
                None => {
                    warn!("Threshold dithering requested without a matrix; using ordered");
                    apply_ordered(data, width, height, bits);
                }
            },
        }
    }
}

/// Error-diffusion kernel: `(dx, dy, weight)` taps over `divisor`
struct Kernel {
    taps: &'static [(i32, i32, i32)],
    divisor: i32,
}

impl Kernel {
    fn max_dy(&self) -> usize {
        self.taps.iter().map(|t| t.1).max().unwrap_or(0) as usize
    }

    fn reach_x(&self) -> usize {
        self.taps.iter().map(|t| t.0.unsigned_abs()).max().unwrap_or(0) as usize
    }
}

const FLOYD_STEINBERG: Kernel = Kernel {
    taps: &[(1, 0, 7), (-1, 1, 3), (0, 1, 5), (1, 1, 1)],
    divisor: 16,
};

const SIERRA: Kernel = Kernel {
    taps: &[
        (1, 0, 5),
        (2, 0, 3),
        (-2, 1, 2),
        (-1, 1, 4),
        (0, 1, 5),
        (1, 1, 4),
        (2, 1, 2),
        (-1, 2, 2),
        (0, 2, 3),
        (1, 2, 2),
    ],
    divisor: 32,
};

// Only 6/8 of the error is spread, which keeps highlights crisp
const ATKINSON: Kernel = Kernel {
    taps: &[(1, 0, 1), (2, 0, 1), (-1, 1, 1), (0, 1, 1), (1, 1, 1), (0, 2, 1)],
    divisor: 8,
};

/// Number of levels per channel, or `None` when no reduction is needed
fn max_level(bits: u8) -> Option<i32> {
    let bits = bits.max(1);
    if bits >= 8 {
        return None;
    }
    Some((1i32 << bits) - 1)
}

#[inline]
fn quantize(v: i32, max: i32) -> i32 {
    let v = v.clamp(0, 255);
    let q = (v * max + 127) / 255;
    q * 255 / max
}

fn check_len(data: &[u8], width: u32, height: u32) -> bool {
    let expected = width as usize * height as usize * 4;
    if data.len() != expected {
        warn!(
            "Dither skipped: {} bytes for a {}x{} RGBA buffer (expected {})",
            data.len(),
            width,
            height,
            expected
        );
        return false;
    }
    true
}

fn diffuse(data: &mut [u8], width: u32, height: u32, bits: u8, kernel: &Kernel, scan: ScanOrder) {
    let Some(max) = max_level(bits) else { return };
    if !check_len(data, width, height) {
        return;
    }
    let w = width as usize;
    let h = height as usize;
    let pad = kernel.reach_x();
    let stride = (w + 2 * pad) * 3;
    let rows = kernel.max_dy() + 1;
    let mut errors = vec![vec![0i32; stride]; rows];

    for y in 0..h {
        let slot = y % rows;
        let reverse = scan == ScanOrder::Serpentine && y % 2 == 1;

        for step in 0..w {
            let x = if reverse { w - 1 - step } else { step };
            let idx = (y * w + x) * 4;
            if data[idx + 3] == 0 {
                continue;
            }
            for c in 0..3 {
                let acc = errors[slot][(x + pad) * 3 + c];
                let old = (i32::from(data[idx + c]) + acc / kernel.divisor).clamp(0, 255);
                let new = quantize(old, max);
                data[idx + c] = new as u8;
                let err = old - new;
                if err == 0 {
                    continue;
                }
                for &(dx, dy, weight) in kernel.taps {
                    let dx = if reverse { -dx } else { dx };
                    let nx = x as i64 + i64::from(dx);
                    let ny = y + dy as usize;
                    if nx < 0 || nx >= w as i64 || ny >= h {
                        continue;
                    }
                    let col = (nx as usize + pad) * 3 + c;
                    errors[ny % rows][col] += err * weight;
                }
            }
        }
        errors[slot].fill(0);
    }
}

/// Floyd–Steinberg error diffusion
pub fn apply_floyd_steinberg(data: &mut [u8], width: u32, height: u32, bits: u8, scan: ScanOrder) {
    diffuse(data, width, height, bits, &FLOYD_STEINBERG, scan);
}

/// Three-row Sierra error diffusion
pub fn apply_sierra(data: &mut [u8], width: u32, height: u32, bits: u8, scan: ScanOrder) {
    diffuse(data, width, height, bits, &SIERRA, scan);
}

/// Atkinson error diffusion
pub fn apply_atkinson(data: &mut [u8], width: u32, height: u32, bits: u8, scan: ScanOrder) {
    diffuse(data, width, height, bits, &ATKINSON, scan);
}

/// Tiled threshold offsets in `[-0.5, 0.5)`
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdMatrix {
    width: usize,
    height: usize,
    values: Vec<f32>,
}

impl ThresholdMatrix {
    /// Build from integer ranks `0..width*height`
    pub fn from_ranks(width: usize, height: usize, ranks: &[u32]) -> Option<Self> {
        let n = width * height;
        if n == 0 || ranks.len() != n {
            return None;
        }
        let values = ranks
            .iter()
            .map(|&r| (r as f32 + 0.5) / n as f32 - 0.5)
            .collect();
        Some(Self { width, height, values })
    }

    /// Use the brightness of an external raster as the threshold pattern
    pub fn from_image(image: &LoadedImage) -> Self {
        let width = image.width() as usize;
        let height = image.height() as usize;
        let mut values = Vec::with_capacity(width * height);
        for y in 0..image.height() {
            for x in 0..image.width() {
                let [r, g, b, _] = image.rgba_at(x, y);
                values.push((luma(r, g, b) as f32 + 0.5) / 256.0 - 0.5);
            }
        }
        Self { width, height, values }
    }

    /// Classic recursive Bayer matrix of size `2^order`
    pub fn bayer(order: u32) -> Self {
        let mut m = vec![0u32];
        let mut size = 1usize;
        for _ in 0..order {
            let next = size * 2;
            let mut grown = vec![0u32; next * next];
            for y in 0..size {
                for x in 0..size {
                    let v = m[y * size + x] * 4;
                    grown[y * next + x] = v;
                    grown[y * next + x + size] = v + 2;
                    grown[(y + size) * next + x] = v + 3;
                    grown[(y + size) * next + x + size] = v + 1;
                }
            }
            m = grown;
            size = next;
        }
        let n = size * size;
        Self {
            width: size,
            height: size,
            values: m.iter().map(|&r| (r as f32 + 0.5) / n as f32 - 0.5).collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.values[(y % self.height) * self.width + (x % self.width)]
    }
}

fn bayer8() -> &'static ThresholdMatrix {
    static BAYER: OnceLock<ThresholdMatrix> = OnceLock::new();
    BAYER.get_or_init(|| ThresholdMatrix::bayer(3))
}

const BLUE_NOISE_SIZE: usize = 32;

/// The shared 32x32 blue-noise matrix
pub fn blue_noise() -> &'static ThresholdMatrix {
    static BLUE: OnceLock<ThresholdMatrix> = OnceLock::new();
    BLUE.get_or_init(|| {
        let ranks = void_and_cluster(BLUE_NOISE_SIZE);
        debug!("Generated {0}x{0} blue-noise matrix", BLUE_NOISE_SIZE);
        ThresholdMatrix::from_ranks(BLUE_NOISE_SIZE, BLUE_NOISE_SIZE, &ranks)
            .unwrap_or_else(|| ThresholdMatrix::bayer(5))
    })
}

/// Ulichney's void-and-cluster ranking on a torus
fn void_and_cluster(size: usize) -> Vec<u32> {
    let n = size * size;
    let sigma2 = 2.0 * 1.5f32 * 1.5;
    let lut: Vec<f32> = (0..n)
        .map(|i| {
            let dx = (i % size).min(size - i % size);
            let dy = (i / size).min(size - i / size);
            (-((dx * dx + dy * dy) as f32) / sigma2).exp()
        })
        .collect();

    let splat = |energy: &mut [f32], p: usize, sign: f32| {
        let (px, py) = (p % size, p / size);
        for (q, e) in energy.iter_mut().enumerate() {
            let dx = (q % size + size - px) % size;
            let dy = (q / size + size - py) % size;
            *e += sign * lut[dy * size + dx];
        }
    };
    let tightest = |pattern: &[bool], energy: &[f32]| -> usize {
        let mut best = 0;
        let mut best_e = f32::MIN;
        for (i, (&set, &e)) in pattern.iter().zip(energy).enumerate() {
            if set && e > best_e {
                best = i;
                best_e = e;
            }
        }
        best
    };
    let largest_void = |pattern: &[bool], energy: &[f32]| -> usize {
        let mut best = 0;
        let mut best_e = f32::MAX;
        for (i, (&set, &e)) in pattern.iter().zip(energy).enumerate() {
            if !set && e < best_e {
                best = i;
                best_e = e;
            }
        }
        best
    };

    // Seed pattern from a fixed LCG so the matrix is reproducible
    let ones = n / 10;
    let mut pattern = vec![false; n];
    let mut energy = vec![0f32; n];
    let mut seed: u32 = 0x9E37_79B9;
    let mut placed = 0;
    while placed < ones {
        seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let p = (seed >> 8) as usize % n;
        if !pattern[p] {
            pattern[p] = true;
            splat(&mut energy, p, 1.0);
            placed += 1;
        }
    }

    // Relax: move the tightest cluster into the largest void until stable
    for _ in 0..n {
        let cluster = tightest(&pattern, &energy);
        pattern[cluster] = false;
        splat(&mut energy, cluster, -1.0);
        let void = largest_void(&pattern, &energy);
        pattern[void] = true;
        splat(&mut energy, void, 1.0);
        if void == cluster {
            break;
        }
    }

    let mut rank = vec![0u32; n];
    let initial = pattern.clone();
    let initial_energy = energy.clone();

    for r in (0..ones).rev() {
        let cluster = tightest(&pattern, &energy);
        pattern[cluster] = false;
        splat(&mut energy, cluster, -1.0);
        rank[cluster] = r as u32;
    }

    pattern = initial;
    energy = initial_energy;
    for r in ones..n {
        let void = largest_void(&pattern, &energy);
        pattern[void] = true;
        splat(&mut energy, void, 1.0);
        rank[void] = r as u32;
    }

    rank
}

/// Apply any threshold matrix; no error is carried between pixels
pub fn apply_threshold_matrix(data: &mut [u8], width: u32, height: u32, bits: u8, matrix: &ThresholdMatrix) {
    let Some(max) = max_level(bits) else { return };
    if !check_len(data, width, height) {
        return;
    }
    let step = 255.0 / max as f32;
    let w = width as usize;
    for (i, px) in data.chunks_exact_mut(4).enumerate() {
        if px[3] == 0 {
            continue;
        }
        let offset = matrix.at(i % w, i / w) * step;
        for c in px.iter_mut().take(3) {
            let v = (f32::from(*c) + offset).round() as i32;
            *c = quantize(v, max) as u8;
        }
    }
}

/// 8x8 Bayer ordered dithering
pub fn apply_ordered(data: &mut [u8], width: u32, height: u32, bits: u8) {
    apply_threshold_matrix(data, width, height, bits, bayer8());
}

/// Blue-noise threshold dithering
pub fn apply_blue_noise(data: &mut [u8], width: u32, height: u32, bits: u8) {
    apply_threshold_matrix(data, width, height, bits, blue_noise());
}

/// Memoized dither of the composited buffer
///
/// Holds a byte scratch buffer sized to the canvas; recomputed only when the
/// composite changed or the algorithm/bit depth differ from the last run.
#[derive(Debug, Default)]
pub struct DitherCache {
    algorithm: Option<DitherAlgorithm>,
    bits: u8,
    valid: bool,
    bytes: Vec<u8>,
}

impl DitherCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Drop the scratch allocation (resize)
    pub fn reset(&mut self) {
        self.valid = false;
        self.algorithm = None;
        self.bytes = Vec::new();
    }

    pub fn algorithm(&self) -> Option<DitherAlgorithm> {
        self.algorithm
    }

    /// Dithered RGBA bytes of `buffer`'s composite
    pub fn get_or_update(
        &mut self,
        buffer: &PixelBuffer,
        algorithm: DitherAlgorithm,
        bits: u8,
        matrix: Option<&ThresholdMatrix>,
    ) -> &[u8] {
        let fresh = self.valid
            && self.algorithm == Some(algorithm)
            && self.bits == bits
            && self.bytes.len() == buffer.len() * 4;
        if !fresh {
            buffer.composite_rgba_into(&mut self.bytes);
            algorithm.apply(&mut self.bytes, buffer.width(), buffer.height(), bits, matrix);
            self.algorithm = Some(algorithm);
            self.bits = bits;
            self.valid = true;
            debug!("Dither cache refreshed ({:?}, {} bits)", algorithm, bits);
        }
        &self.bytes
    }
}
