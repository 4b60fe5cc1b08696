//! Properties every dithering algorithm must hold.

use rstest::rstest;

use termcanvas::canvas::dither::{DitherAlgorithm, ThresholdMatrix};

fn noise(width: u32, height: u32, seed: u32) -> Vec<u8> {
    let mut state = seed;
    (0..width * height * 4)
        .map(|i| {
            if i % 4 == 3 {
                return 255;
            }
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        })
        .collect()
}

fn run(algorithm: DitherAlgorithm, data: &mut [u8], width: u32, height: u32, bits: u8) {
    let matrix = ThresholdMatrix::bayer(4);
    algorithm.apply(data, width, height, bits, Some(&matrix));
}

#[rstest]
fn test_one_bit_yields_extremes(
    #[values(
        DitherAlgorithm::FloydSteinberg,
        DitherAlgorithm::FloydSteinbergStable,
        DitherAlgorithm::Sierra,
        DitherAlgorithm::SierraStable,
        DitherAlgorithm::Atkinson,
        DitherAlgorithm::AtkinsonStable,
        DitherAlgorithm::Ordered,
        DitherAlgorithm::BlueNoise,
        DitherAlgorithm::Threshold
    )]
    algorithm: DitherAlgorithm,
    #[values((1, 1), (7, 5), (33, 17))] size: (u32, u32),
) {
    let (w, h) = size;
    let mut data = noise(w, h, w * 31 + h);
    let len = data.len();
    run(algorithm, &mut data, w, h, 1);
    assert_eq!(data.len(), len);
    for px in data.chunks_exact(4) {
        assert!(px[..3].iter().all(|&v| v == 0 || v == 255), "{algorithm:?}: {px:?}");
        assert_eq!(px[3], 255);
    }
}

#[rstest]
#[case(DitherAlgorithm::FloydSteinbergStable)]
#[case(DitherAlgorithm::SierraStable)]
#[case(DitherAlgorithm::AtkinsonStable)]
#[case(DitherAlgorithm::Ordered)]
#[case(DitherAlgorithm::BlueNoise)]
fn test_frame_stable_algorithms_are_deterministic(#[case] algorithm: DitherAlgorithm) {
    assert!(algorithm.is_frame_stable());
    let source = noise(16, 9, 7);
    let mut a = source.clone();
    let mut b = source;
    run(algorithm, &mut a, 16, 9, 2);
    run(algorithm, &mut b, 16, 9, 2);
    assert_eq!(a, b);
}

#[rstest]
#[case(2, 4)]
#[case(3, 8)]
fn test_levels_per_channel(#[case] bits: u8, #[case] levels: usize) {
    let mut data = noise(32, 32, 99);
    run(DitherAlgorithm::FloydSteinberg, &mut data, 32, 32, bits);
    let mut seen: Vec<u8> = data
        .chunks_exact(4)
        .flat_map(|px| px[..3].to_vec())
        .collect();
    seen.sort_unstable();
    seen.dedup();
    assert!(seen.len() <= levels, "{} distinct values for {bits} bits", seen.len());
}

#[test]
fn test_transparent_and_mismatched_input_untouched() {
    let mut data = vec![120, 60, 30, 0, 200, 100, 50, 255];
    DitherAlgorithm::Atkinson.apply(&mut data, 2, 1, 1, None);
    assert_eq!(&data[..4], &[120, 60, 30, 0]);

    let mut short = vec![1, 2, 3, 4, 5, 6, 7];
    DitherAlgorithm::Ordered.apply(&mut short, 2, 1, 1, None);
    assert_eq!(short, vec![1, 2, 3, 4, 5, 6, 7]);

    let mut full = noise(3, 3, 5);
    let before = full.clone();
    DitherAlgorithm::BlueNoise.apply(&mut full, 3, 3, 8, None);
    assert_eq!(full, before);
}
