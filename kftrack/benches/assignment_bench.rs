use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kftrack::{hungarian, MultiTracker, Observation, TrackerConfig};
use ndarray::Array2;
use rand::prelude::*;
use std::time::Instant;

fn random_cost_matrix(tracks: usize, detections: usize) -> Array2<f64> {
    let mut rng = thread_rng();
    Array2::from_shape_fn((tracks, detections), |_| rng.gen_range(0.0..500.0))
}

fn bench_assignment_small(c: &mut Criterion) {
    let costs = random_cost_matrix(10, 10);
    c.bench_function("assignment_10x10", |b| {
        b.iter(|| hungarian::solve(black_box(costs.view())))
    });
}

fn bench_assignment_rectangular(c: &mut Criterion) {
    let costs = random_cost_matrix(30, 10);
    c.bench_function("assignment_30x10", |b| {
        b.iter(|| hungarian::solve(black_box(costs.view())))
    });
}

fn bench_assignment_large(c: &mut Criterion) {
    let costs = random_cost_matrix(100, 100);
    c.bench_function("assignment_100x100", |b| {
        b.iter(|| hungarian::solve(black_box(costs.view())))
    });
}

fn bench_tracker_step(c: &mut Criterion) {
    let mut rng = thread_rng();
    let batch: Vec<Observation<u8>> = (0..32)
        .map(|_| Observation {
            class: rng.gen_range(0..3u8),
            x: rng.gen_range(0.0..1900.0),
            y: rng.gen_range(0.0..1060.0),
            w: 20.0,
            h: 20.0,
        })
        .collect();

    c.bench_function("tracker_step_32", |b| {
        let mut tracker: MultiTracker<u8> = MultiTracker::new(TrackerConfig::default());
        tracker.step(batch.clone(), Instant::now());
        b.iter(|| tracker.step(black_box(batch.clone()), Instant::now()))
    });
}

criterion_group!(
    benches,
    bench_assignment_small,
    bench_assignment_rectangular,
    bench_assignment_large,
    bench_tracker_step
);
criterion_main!(benches);
