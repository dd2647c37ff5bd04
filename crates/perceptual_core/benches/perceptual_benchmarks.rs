//! Criterion benchmarks for the steerable pyramid and the perceptual metrics.
//!
//! Run with: cargo bench -p perceptual_core
//! Run specific: cargo bench -p perceptual_core -- pyramid_forward

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::{Array2, Array4};
use rand::prelude::*;

use perceptual_core::{
    ms_ssim, nlpd, nspd, ssim, Execution, Height, LaplacianPyramid, NlpdParams, NspdSigmas,
    PyramidConfig, Selection, SteerablePyramid,
};

// =============================================================================
// Helper Functions for Test Data Generation
// =============================================================================

fn random_image_f32(batch: usize, rows: usize, cols: usize, seed: u64) -> Array4<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array4::from_shape_fn((batch, 1, rows, cols), |_| rng.gen())
}

fn random_image_f64(batch: usize, rows: usize, cols: usize, seed: u64) -> Array4<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array4::from_shape_fn((batch, 1, rows, cols), |_| rng.gen())
}

fn box_nlpd_params() -> NlpdParams {
    let filter = Array2::from_elem((5, 5), 1.0 / 25.0);
    NlpdParams::new(vec![filter; 6], vec![0.17; 6]).expect("valid NLPD parameters")
}

// =============================================================================
// Pyramid Benchmarks
// =============================================================================

fn bench_pyramid_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("pyramid_construction");

    for size in [64, 128, 256] {
        group.bench_with_input(BenchmarkId::new("masks", size), &size, |b, &size| {
            b.iter(|| {
                SteerablePyramid::<f32>::new(black_box(PyramidConfig::new((size, size))))
                    .expect("pyramid builds")
            })
        });
    }

    group.finish();
}

fn bench_pyramid_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("pyramid_forward");

    for size in [64, 128, 256] {
        let image = random_image_f32(4, size, size, 42);
        group.throughput(Throughput::Elements((4 * size * size) as u64));

        let targets = [
            ("sequential", Execution::Sequential),
            ("parallel", Execution::Parallel),
        ];
        for (label, execution) in targets {
            let config = PyramidConfig::new((size, size)).execution(execution);
            let mut pyr = SteerablePyramid::<f32>::new(config).expect("pyramid builds");
            group.bench_with_input(BenchmarkId::new(label, size), &size, |b, _| {
                b.iter(|| pyr.forward(black_box(image.view()), &[]).expect("forward"))
            });
        }

        let complex = PyramidConfig::new((size, size)).is_complex(true);
        let mut pyr = SteerablePyramid::<f32>::new(complex).expect("pyramid builds");
        group.bench_with_input(BenchmarkId::new("complex", size), &size, |b, _| {
            b.iter(|| pyr.forward(black_box(image.view()), &[]).expect("forward"))
        });
    }

    group.finish();
}

fn bench_pyramid_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("pyramid_roundtrip");
    group.sample_size(20);

    for (size, downsample) in [(128, true), (128, false), (256, true)] {
        let image = random_image_f64(1, size, size, 7);
        let config = PyramidConfig::new((size, size))
            .height(Height::Auto)
            .downsample(downsample);
        let mut pyr = SteerablePyramid::<f64>::new(config).expect("pyramid builds");
        let coeffs = pyr.forward(image.view(), &[]).expect("forward");
        let label = if downsample { "downsampled" } else { "full_size" };

        group.throughput(Throughput::Elements((size * size) as u64));
        group.bench_with_input(BenchmarkId::new(label, size), &size, |b, _| {
            b.iter(|| {
                pyr.recon_pyr(black_box(&coeffs), Selection::All, Selection::All, 1.0)
                    .expect("recon")
            })
        });
    }

    group.finish();
}

// =============================================================================
// Metric Benchmarks
// =============================================================================

fn bench_ssim(c: &mut Criterion) {
    let mut group = c.benchmark_group("ssim");

    for size in [64, 256] {
        let a = random_image_f32(1, size, size, 1);
        let b_img = random_image_f32(1, size, size, 2);
        group.throughput(Throughput::Elements((size * size) as u64));

        group.bench_with_input(BenchmarkId::new("ssim", size), &size, |b, _| {
            b.iter(|| ssim(black_box(a.view()), b_img.view(), false, 1.0, None).expect("ssim"))
        });
        group.bench_with_input(BenchmarkId::new("ms_ssim", size), &size, |b, _| {
            b.iter(|| ms_ssim(black_box(a.view()), b_img.view(), 1.0, None).expect("ms_ssim"))
        });
    }

    group.finish();
}

fn bench_normalized_distances(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalized_distances");
    group.sample_size(10);

    let params = box_nlpd_params();
    let sigmas = NspdSigmas::uniform(5, 4, 0.05);

    for size in [128, 256] {
        let a = random_image_f64(1, size, size, 3);
        let b_img = random_image_f64(1, size, size, 4);
        group.throughput(Throughput::Elements((size * size) as u64));

        group.bench_with_input(BenchmarkId::new("laplacian_forward", size), &size, |b, _| {
            let pyr = LaplacianPyramid::new(6, true);
            b.iter(|| pyr.forward(black_box(a.view())))
        });
        group.bench_with_input(BenchmarkId::new("nlpd", size), &size, |b, _| {
            b.iter(|| nlpd(black_box(a.view()), b_img.view(), &params).expect("nlpd"))
        });
        group.bench_with_input(BenchmarkId::new("nspd", size), &size, |b, _| {
            b.iter(|| nspd(black_box(a.view()), b_img.view(), &sigmas).expect("nspd"))
        });
    }

    group.finish();
}

// =============================================================================
// Criterion Configuration
// =============================================================================

criterion_group!(
    benches,
    bench_pyramid_construction,
    bench_pyramid_forward,
    bench_pyramid_roundtrip,
    bench_ssim,
    bench_normalized_distances,
);

criterion_main!(benches);
