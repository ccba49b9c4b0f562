//! Benchmarks for IDW point sampling and cross-validated GP scoring

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use erosivity::calibration::{cross_val_r2, KFold};
use erosivity::raster::GeoTransform;
use erosivity::sampling::{sample_points, QueryPoint};
use erosivity::{Hyperparameters, RasterGrid};
use ndarray::Array2;

fn create_grid(size: usize) -> RasterGrid {
    let values = Array2::from_shape_fn((size, size), |(row, col)| {
        let base = (row + col) as f64;
        let variation = ((row * 7 + col * 13) % 100) as f64 / 10.0;
        base + variation
    });
    RasterGrid::new(values, GeoTransform::new(0.0, size as f64, 1.0, -1.0), 0.0).unwrap()
}

fn create_points(size: usize, n: usize) -> Vec<QueryPoint> {
    (0..n)
        .map(|i| {
            let t = i as f64 / n as f64;
            QueryPoint::new(t * size as f64, ((i * 37) % n) as f64 / n as f64 * size as f64)
        })
        .collect()
}

fn bench_sample_points(c: &mut Criterion) {
    let mut group = c.benchmark_group("sample_points");
    let grid = create_grid(1024);

    for n in [1_000, 10_000, 100_000].iter() {
        let points = create_points(1024, *n);
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, _| {
            b.iter(|| sample_points(black_box(&grid), black_box(&points)))
        });
    }

    group.finish();
}

fn bench_cross_val_r2(c: &mut Criterion) {
    let mut group = c.benchmark_group("cross_val_r2");
    let params = Hyperparameters::new(1.0, 1e-3).unwrap();

    for n in [100, 400].iter() {
        let x = Array2::from_shape_fn((*n, 2), |(i, j)| ((i * (j + 3)) % 97) as f64 / 97.0);
        let y: Vec<f64> = x.rows().into_iter().map(|r| r[0] * 2.0 + r[1]).collect();
        let folds = KFold::new(5, 42).split(*n).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, _| {
            b.iter(|| cross_val_r2(black_box(&x), black_box(&y), params, &folds).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sample_points, bench_cross_val_r2);
criterion_main!(benches);
