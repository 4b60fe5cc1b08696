//! Criterion benchmarks for the per-frame hot paths.
//!
//! Run with: `cargo bench`
//! Quick compile check: `cargo bench -- --test`

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;

use termcanvas::canvas::dither::DitherAlgorithm;
use termcanvas::canvas::palette::Palette;
use termcanvas::canvas::rasterizer::{CellGeometry, FrameView, Rasterizer};
use termcanvas::canvas::sextant::SextantRasterizer;
use termcanvas::canvas::sixel::encode_sixel;
use termcanvas::canvas::Color;

/// 80x24 cells of sextant pixels with a diagonal gradient
fn gradient(width: u32, height: u32) -> Vec<u32> {
    let mut pixels = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            let r = (x * 255 / width) as u8;
            let g = (y * 255 / height) as u8;
            let b = ((x + y) % 256) as u8;
            pixels.push(Color::rgb(r, g, b).pack());
        }
    }
    pixels
}

fn to_rgba(pixels: &[u32]) -> Vec<u8> {
    pixels
        .iter()
        .flat_map(|&p| {
            let c = Color::unpack(p);
            [c.r, c.g, c.b, c.a]
        })
        .collect()
}

fn bench_dither(c: &mut Criterion) {
    let (w, h) = (160, 72);
    let rgba = to_rgba(&gradient(w, h));
    let mut group = c.benchmark_group("dither");
    group.throughput(Throughput::Bytes(rgba.len() as u64));

    for algorithm in [
        DitherAlgorithm::FloydSteinberg,
        DitherAlgorithm::Atkinson,
        DitherAlgorithm::Ordered,
        DitherAlgorithm::BlueNoise,
    ] {
        group.bench_function(format!("{algorithm:?}"), |b| {
            b.iter(|| {
                let mut data = rgba.clone();
                algorithm.apply(black_box(&mut data), w, h, 2, None);
                data
            });
        });
    }
    group.finish();
}

fn bench_sextant(c: &mut Criterion) {
    let (cols, rows) = (80u16, 24u16);
    let (w, h) = (u32::from(cols) * 2, u32::from(rows) * 3);
    let pixels = gradient(w, h);
    let drawing = vec![0u32; pixels.len()];
    let area = Rect::new(0, 0, cols, rows);
    let frame = FrameView {
        pixels: &pixels,
        drawing: &drawing,
        width: w,
        height: h,
        geometry: CellGeometry::character(1),
        source_id: 1,
        dynamic: false,
        clip: area,
    };

    let mut group = c.benchmark_group("sextant");
    group.throughput(Throughput::Elements(u64::from(cols) * u64::from(rows)));
    group.bench_function("80x24", |b| {
        let mut rasterizer = SextantRasterizer::new();
        let mut buf = Buffer::empty(area);
        b.iter(|| rasterizer.rasterize(black_box(&frame), area, &mut buf, Style::default()));
    });
    group.finish();
}

fn bench_palette(c: &mut Criterion) {
    let pixels = gradient(320, 192);
    let mut group = c.benchmark_group("palette");

    group.bench_function("median_cut", |b| {
        b.iter(|| Palette::median_cut(black_box(&pixels), 255));
    });

    let mut palette = Palette::median_cut(&pixels, 255);
    let mut indices = Vec::new();
    palette.index_frame(&pixels, &mut indices);
    group.bench_function("index_frame", |b| {
        b.iter(|| palette.index_frame(black_box(&pixels), &mut indices));
    });

    group.bench_function("encode_sixel", |b| {
        b.iter(|| encode_sixel(black_box(&indices), 320, 192, &palette));
    });
    group.finish();
}

criterion_group!(benches, bench_dither, bench_sextant, bench_palette);
criterion_main!(benches);
