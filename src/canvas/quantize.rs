//! Two-color split of a sub-cell block

use super::color::{luma, unpack_rgba, Color, TRANSPARENT};

/// Foreground/background split of one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantized {
    /// Bit `i` set when sample `i` belongs to the foreground
    pub mask: u8,
    pub fg: Color,
    pub bg: Color,
}

#[derive(Default)]
struct Accum {
    r: u32,
    g: u32,
    b: u32,
    n: u32,
}

impl Accum {
    fn add(&mut self, (r, g, b): (u8, u8, u8)) {
        self.r += u32::from(r);
        self.g += u32::from(g);
        self.b += u32::from(b);
        self.n += 1;
    }

    fn mean(&self) -> Option<Color> {
        if self.n == 0 {
            return None;
        }
        Some(Color::rgb(
            (self.r / self.n) as u8,
            (self.g / self.n) as u8,
            (self.b / self.n) as u8,
        ))
    }
}

/// Split up to 8 packed samples into a bright and a dark group
///
/// Transparent samples are ignored and never set in the mask. `None` when
/// every sample is transparent.
pub fn quantize_block(samples: &[u32]) -> Option<Quantized> {
    debug_assert!(samples.len() <= 8);

    let mut valid: u8 = 0;
    let mut lumas = [0u32; 8];
    let mut rgb = [(0u8, 0u8, 0u8); 8];
    let mut first = None;
    let mut uniform = true;
    let (mut min, mut max, mut sum) = (u32::MAX, 0u32, 0u32);

    for (i, &px) in samples.iter().enumerate().take(8) {
        if px == TRANSPARENT {
            continue;
        }
        valid |= 1 << i;
        let (r, g, b, _) = unpack_rgba(px);
        rgb[i] = (r, g, b);
        let l = luma(r, g, b);
        lumas[i] = l;
        min = min.min(l);
        max = max.max(l);
        sum += l;
        match first {
            None => first = Some((r, g, b)),
            Some(c) if c != (r, g, b) => uniform = false,
            Some(_) => {}
        }
    }

    let (r, g, b) = first?;
    if uniform {
        let c = Color::rgb(r, g, b);
        return Some(Quantized { mask: valid, fg: c, bg: c });
    }

    let split = |threshold: u32| -> u8 {
        (0..8)
            .filter(|&i| valid & (1 << i) != 0 && lumas[i] > threshold)
            .fold(0u8, |m, i| m | (1 << i))
    };

    let mut mask = split((min + max) / 2);
    if mask == 0 || mask == valid {
        let count = valid.count_ones();
        mask = split(sum / count);
    }

    let mut on = Accum::default();
    let mut off = Accum::default();
    for i in 0..8 {
        if valid & (1 << i) == 0 {
            continue;
        }
        if mask & (1 << i) != 0 {
            on.add(rgb[i]);
        } else {
            off.add(rgb[i]);
        }
    }

    let (fg, bg) = match (on.mean(), off.mean()) {
        (Some(fg), Some(bg)) => (fg, bg),
        (Some(only), None) | (None, Some(only)) => (only, only),
        (None, None) => return None,
    };
    Some(Quantized { mask, fg, bg })
}

/// Channel mean of the visible samples
pub fn mean_color(samples: &[u32]) -> Option<Color> {
    let mut acc = Accum::default();
    for &px in samples {
        if px != TRANSPARENT {
            let (r, g, b, _) = unpack_rgba(px);
            acc.add((r, g, b));
        }
    }
    acc.mean()
}

/// Mean luma of the visible samples
pub fn mean_luma(samples: &[u32]) -> Option<u32> {
    let (sum, n) = samples
        .iter()
        .filter(|&&px| px != TRANSPARENT)
        .map(|&px| {
            let (r, g, b, _) = unpack_rgba(px);
            luma(r, g, b)
        })
        .fold((0u32, 0u32), |(s, n), l| (s + l, n + 1));
    (n > 0).then(|| sum / n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(c: Color) -> u32 {
        c.pack()
    }

    #[test]
    fn test_uniform_block_is_idempotent() {
        let c = Color::rgb(12, 200, 99);
        let q = quantize_block(&[p(c); 6]).unwrap();
        assert_eq!(q.mask, 0b11_1111);
        assert_eq!(q.fg, c);
        assert_eq!(q.bg, c);
    }

    #[test]
    fn test_all_transparent() {
        assert_eq!(quantize_block(&[TRANSPARENT; 6]), None);
        assert_eq!(mean_color(&[TRANSPARENT; 6]), None);
        assert_eq!(mean_luma(&[]), None);
    }

    #[test]
    fn test_uniform_with_holes_only_marks_valid() {
        let w = p(Color::WHITE);
        let q = quantize_block(&[w, TRANSPARENT, w, w, TRANSPARENT, w]).unwrap();
        assert_eq!(q.mask, 0b10_1101);
        assert_eq!(q.fg, Color::WHITE);
    }

    #[test]
    fn test_split_uses_group_means() {
        // rows: [R, G], [R, G], [B, W]
        let (r, g, b, w) = (p(Color::RED), p(Color::GREEN), p(Color::BLUE), p(Color::WHITE));
        let q = quantize_block(&[r, g, r, g, b, w]).unwrap();
        assert_eq!(q.mask, 0b10_1010);
        assert_eq!(q.fg, Color::rgb(85, 255, 85));
        assert_eq!(q.bg, Color::rgb(170, 0, 85));
    }

    #[test]
    fn test_small_luma_gap_still_splits() {
        // lumas 0 and 2: the midpoint 1 separates them
        let dark = p(Color::rgb(0, 0, 0));
        let mid = p(Color::rgb(0, 0, 20));
        let q = quantize_block(&[dark, dark, mid]).unwrap();
        assert_eq!(q.mask, 0b100);
        assert_eq!(q.bg, Color::BLACK);
        assert_eq!(q.fg, Color::rgb(0, 0, 20));
    }

    #[test]
    fn test_same_luma_falls_back_to_single_group() {
        // distinct colors with equal luma: neither threshold separates them
        let a = p(Color::rgb(10, 0, 0));
        let b = p(Color::rgb(0, 5, 0));
        let q = quantize_block(&[a, b]).unwrap();
        assert_eq!(q.mask, 0);
        assert_eq!(q.fg, q.bg);
        assert_eq!(q.bg, Color::rgb(5, 2, 0));
    }
}
