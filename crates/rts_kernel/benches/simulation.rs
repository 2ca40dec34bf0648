//! Frame update benchmarks for rts_kernel.
//!
//! Run with: `cargo bench -p rts_kernel`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rts_test_utils::fixtures::{duel_scenario, skirmish_scenario};

/// Measures single frame updates and a short battle.
pub fn simulation_benchmark(c: &mut Criterion) {
    c.bench_function("idle_map_frame", |b| {
        let mut scenario = duel_scenario(1);
        b.iter(|| black_box(scenario.update()));
    });

    c.bench_function("skirmish_frame", |b| {
        b.iter_batched(
            || skirmish_scenario(1),
            |mut scenario| black_box(scenario.update()),
            BatchSize::SmallInput,
        );
    });

    c.bench_function("skirmish_300_frames", |b| {
        b.iter_batched(
            || skirmish_scenario(1),
            |mut scenario| {
                for _ in 0..300 {
                    scenario.update();
                }
                black_box(scenario.state_digest())
            },
            BatchSize::SmallInput,
        );
    });

    c.bench_function("state_digest", |b| {
        let scenario = skirmish_scenario(1);
        b.iter(|| black_box(scenario.state_digest()));
    });
}

criterion_group!(benches, simulation_benchmark);
criterion_main!(benches);
