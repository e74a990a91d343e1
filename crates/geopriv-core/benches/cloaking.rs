//! Benchmarks for spatial cloaking
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use geopriv_core::batch::{BatchCloaker, BatchConfig};
use geopriv_core::cloak::{cloak, cloak_conditioned, rank, AttributeEquals};
use geopriv_core::rng::seeded;
use geopriv_core::{CloakConfig, DistanceMetric, GeometryKind, Point, Record, Seed, Target};
use rand::Rng;

fn scatter(n: usize) -> Vec<Record> {
    let mut rng = seeded(Seed::from_string("benchmark-v1"));
    (0..n)
        .map(|i| {
            Record::new(format!("r{}", i))
                .with_quasi("gender", if rng.gen_bool(0.5) { "Female" } else { "Male" })
                .with_location(Point::new(rng.gen_range(0.0..5000.0), rng.gen_range(0.0..5000.0)))
        })
        .collect()
}

fn bench_rank(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank");

    for n in [100, 1_000, 10_000] {
        let records = scatter(n);
        group.bench_with_input(BenchmarkId::new("planar", n), &records, |b, r| {
            b.iter(|| rank(black_box(Point::new(2500.0, 2500.0)), r, DistanceMetric::Planar))
        });
    }

    group.finish();
}

fn bench_cloak(c: &mut Criterion) {
    let records = scatter(1_000);
    let mut group = c.benchmark_group("cloak");

    for shape in [GeometryKind::ConvexHull, GeometryKind::BoundingBox, GeometryKind::Circle] {
        let config = CloakConfig::default().with_k(20).with_focal_rank(10).with_shape(shape);
        group.bench_with_input(BenchmarkId::new("k20", format!("{:?}", shape)), &config, |b, cfg| {
            b.iter(|| cloak(Target::Member(black_box(17)), &records, cfg))
        });
    }

    let female = AttributeEquals::new("gender", "Female");
    let config = CloakConfig::default().with_k(20).with_focal_rank(10);
    group.bench_function("conditioned_k20", |b| {
        b.iter(|| cloak_conditioned(Target::Member(black_box(17)), &records, &config, &female))
    });

    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let records = scatter(500);
    let config = CloakConfig::default().with_k(10).with_focal_rank(5);

    c.bench_function("batch_500_sequential", |b| {
        let cloaker = BatchCloaker::new(BatchConfig::default().with_cloak(config).with_parallel(false));
        b.iter(|| cloaker.cloak_all(black_box(&records)))
    });

    c.bench_function("batch_500_parallel", |b| {
        let cloaker = BatchCloaker::new(BatchConfig::default().with_cloak(config));
        b.iter(|| cloaker.cloak_all(black_box(&records)))
    });
}

criterion_group!(benches, bench_rank, bench_cloak, bench_batch);
criterion_main!(benches);
