use criterion::{black_box, criterion_group, criterion_main, Criterion};

use stereo_diag::prelude::*;

fn texture(x: usize, y: usize) -> u8 {
    let mut v = (x as u32).wrapping_mul(0x9E37_79B9) ^ (y as u32).wrapping_mul(0x85EB_CA6B);
    v ^= v >> 15;
    v = v.wrapping_mul(0x2C1B_3C6D);
    v ^= v >> 12;
    (v & 0xFF) as u8
}

fn block_match_bench(c: &mut Criterion) {
    // Build a textured pair shifted by 12 pixels
    let left = Frame::from_fn(320, 240, texture).unwrap();
    let right = Frame::from_fn(320, 240, |x, y| texture(x + 12, y)).unwrap();

    // Build disparity alg
    let mut matcher = BlockMatcher::new(Params {
        max_disparity: 32,
        block_size: 15,
    })
    .unwrap();
    let pair = StereoPair::new(left, right, AcquisitionMode::SplitSingleFrame).unwrap();

    // Benchmark compute function
    c.bench_function("block_match 320x240 d32 b15", |b| {
        b.iter(|| matcher.compute(black_box(&pair)))
    });
}

fn blob_bench(c: &mut Criterion) {
    // Three discs of different brightness on a dark background
    let img = Frame::from_fn(320, 240, |x, y| {
        let discs = [(60.0, 60.0, 20.0, 250), (160.0, 120.0, 30.0, 180), (260.0, 180.0, 15.0, 120)];
        for &(cx, cy, r, v) in discs.iter() {
            let (dx, dy) = (x as f64 - cx, y as f64 - cy);
            if dx * dx + dy * dy <= r * r {
                return v;
            }
        }
        texture(x, y) / 16
    })
    .unwrap();

    let cfg = ThresholdSweepConfig::default();

    c.bench_function("detect_blobs 320x240 three discs", |b| {
        b.iter(|| detect_blobs(black_box(&img), &cfg))
    });
}

fn preprocess_bench(c: &mut Criterion) {
    let data = (0..320 * 240 * 3).map(|i| texture(i % 960, i / 960)).collect();
    let frame = Frame::new(320, 240, PixelFormat::Bgr8, data).unwrap();

    c.bench_function("grayscale + blur 320x240 k15", |b| {
        b.iter(|| to_grayscale_blurred(black_box(&frame), 15, 0.0))
    });
}

criterion_group!(benches, block_match_bench, blob_bench, preprocess_bench);
criterion_main!(benches);
