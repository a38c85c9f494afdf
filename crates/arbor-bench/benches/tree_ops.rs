//! Criterion benchmarks for tree-wide operations on mock subgrids.

use std::hint::black_box;

use arbor_bench::{build, reference_profile, runtime, stress_profile};
use criterion::{criterion_group, criterion_main, Criterion};

/// One full step (boundaries, gravity, timestep, flux, restriction) on
/// the 73-node reference tree.
fn bench_step_reference(c: &mut Criterion) {
    let rt = runtime().unwrap();
    let sim = rt.block_on(build(reference_profile(1))).unwrap();

    c.bench_function("step_reference_73", |b| {
        b.iter(|| black_box(rt.block_on(sim.step()).unwrap()));
    });
}

/// Same step with the tree spread over four localities.
fn bench_step_four_localities(c: &mut Criterion) {
    let rt = runtime().unwrap();
    let sim = rt.block_on(build(reference_profile(4))).unwrap();

    c.bench_function("step_reference_73_x4", |b| {
        b.iter(|| black_box(rt.block_on(sim.step()).unwrap()));
    });
}

/// Rebalance-only regrid: gather, scatter, form_tree without shape change.
fn bench_rebalance(c: &mut Criterion) {
    let rt = runtime().unwrap();
    let sim = rt.block_on(build(stress_profile(42, 4))).unwrap();

    c.bench_function("regrid_rebalance_stress", |b| {
        b.iter(|| black_box(rt.block_on(sim.regrid(true)).unwrap()));
    });
}

/// Build the reference tree from a single root.
fn bench_initialize(c: &mut Criterion) {
    let rt = runtime().unwrap();

    c.bench_function("initialize_reference", |b| {
        b.iter(|| black_box(rt.block_on(build(reference_profile(1))).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_step_reference,
    bench_step_four_localities,
    bench_rebalance,
    bench_initialize
);
criterion_main!(benches);
