mod fixtures;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use claimlens::aggregate::{Dimension, group_by};
use claimlens::hypothesis::{self, TestRunner};
use claimlens::loader::{LoaderConfig, read_records};

use fixtures::{LARGE, MEDIUM, SMALL, render_pipe_file, synthetic_records};

// ── Group 1: load — row-count scaling through the full coercion path ────────

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load");
    for &rows in &[SMALL, MEDIUM, LARGE] {
        let input = render_pipe_file(&synthetic_records(rows, 42));
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &input, |b, input| {
            b.iter(|| {
                read_records(input.as_bytes(), &LoaderConfig::canonical())
                    .expect("bench input must load")
            })
        });
    }
    group.finish();
}

// ── Group 2: group_by — single-dimension aggregation ────────────────────────

fn bench_group_by(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_by");
    for &rows in &[SMALL, MEDIUM, LARGE] {
        let records = synthetic_records(rows, 42);
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &records, |b, records| {
            b.iter(|| group_by(records, &[Dimension::Province]))
        });
    }
    group.finish();
}

// ── Group 3: battery — the full statistical sweep ───────────────────────────

fn bench_battery(c: &mut Criterion) {
    let mut group = c.benchmark_group("battery");
    group.sample_size(20);
    for &rows in &[MEDIUM, LARGE] {
        let records = synthetic_records(rows, 42);
        let runner = TestRunner::canonical();
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &records, |b, records| {
            b.iter(|| hypothesis::battery(&runner, records))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_load, bench_group_by, bench_battery);
criterion_main!(benches);
