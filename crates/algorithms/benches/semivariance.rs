//! Benchmarks for the areal semivariogram and model fitting

use areakrig_algorithms::semivariance::{
    areal_semivariogram, fit_best_variogram, FitParams, SemivarianceParams, WeightingParams,
};
use areakrig_core::{Area, AreaId, KnownAreas, PointSample};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn create_region(size: usize, points_per_area: usize) -> KnownAreas {
    let mut areas = Vec::with_capacity(size * size);
    let mut points = Vec::with_capacity(size * size);

    for i in 0..size {
        for j in 0..size {
            let id = i * size + j;
            let (cx, cy) = (i as f64 * 10.0, j as f64 * 10.0);
            let value = 50.0 + (i + j) as f64 + ((i * 7 + j * 13) % 10) as f64;
            areas.push(Area::new(id, cx, cy, value));

            let support = (0..points_per_area)
                .map(|k| {
                    let t = k as f64 / points_per_area as f64 * std::f64::consts::TAU;
                    PointSample::new(cx + 3.0 * t.cos(), cy + 3.0 * t.sin(), 100.0 + (k * 11 % 50) as f64)
                })
                .collect();
            points.push((AreaId::from(id), support));
        }
    }
    KnownAreas::new(areas, points).unwrap()
}

fn bench_areal_semivariogram(c: &mut Criterion) {
    let mut group = c.benchmark_group("areal_semivariogram");

    for size in [8, 16, 24].iter() {
        let known = create_region(*size, 8);
        let extent = *size as f64 * 10.0;
        let lags = SemivarianceParams::from_extent(extent, extent, 20).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                areal_semivariogram(black_box(&known), WeightingParams::default(), &lags).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_fit_best_variogram(c: &mut Criterion) {
    let known = create_region(16, 8);
    let lags = SemivarianceParams::from_extent(160.0, 160.0, 20).unwrap();
    let empirical = areal_semivariogram(&known, WeightingParams::default(), &lags).unwrap();

    c.bench_function("fit_best_variogram", |b| {
        b.iter(|| fit_best_variogram(black_box(&empirical), &FitParams::default()).unwrap())
    });
}

criterion_group!(benches, bench_areal_semivariogram, bench_fit_best_variogram);
criterion_main!(benches);
