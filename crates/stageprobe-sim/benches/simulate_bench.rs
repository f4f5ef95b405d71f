//! Benchmark of the CPU lane launch and collision analysis per preset
//!
//! Run with: cargo bench --package stageprobe-sim

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stageprobe_core::{analyze, KernelPreset, PartitionScheme, DEFAULT_CAPACITY};
use stageprobe_sim::simulate_cpu;

fn bench_simulate_cpu(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulate_cpu");

    for preset in KernelPreset::ALL {
        let geometry = preset.geometry().unwrap();
        let partition = geometry.partition().unwrap();
        let lanes = partition.launch_lanes();

        group.throughput(Throughput::Elements(lanes as u64));
        group.bench_with_input(BenchmarkId::from_parameter(preset), &partition, |b, p| {
            b.iter(|| simulate_cpu(p, black_box(DEFAULT_CAPACITY)).unwrap());
        });
    }

    group.finish();
}

fn bench_analyze(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze");

    for preset in KernelPreset::ALL {
        let geometry = preset.geometry().unwrap();
        let partition = geometry.partition().unwrap();
        let sim = simulate_cpu(&partition, DEFAULT_CAPACITY).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(preset), &sim.buffers, |b, buffers| {
            b.iter(|| analyze(black_box(buffers), geometry.lanes_per_warp).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_simulate_cpu, bench_analyze);
criterion_main!(benches);
