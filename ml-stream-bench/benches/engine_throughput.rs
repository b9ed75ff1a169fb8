//! Engine throughput benchmark suite.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ml_stream_bench::{run_engine_once, BenchConfig};
use ml_stream_core::{flatten, Mode, Sample};

fn engine_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");
    group.sample_size(10);

    for mode in [Mode::Synchronous, Mode::Asynchronous] {
        for batch_size in [1, 16, 128] {
            let config = BenchConfig {
                samples: 2_000,
                batch_size,
                ..BenchConfig::default()
            };
            group.throughput(Throughput::Elements(config.records_per_iteration() as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("{mode:?}"), batch_size),
                &config,
                |b, config| b.iter(|| run_engine_once(mode, black_box(config))),
            );
        }
    }

    group.finish();
}

fn flatten_benchmarks(c: &mut Criterion) {
    let nested = || -> Vec<Sample<u64>> {
        (0..1_000u64)
            .map(|i| Sample::nested(vec![Sample::record(i), Sample::nested(vec![Sample::record(i)])]))
            .collect()
    };

    c.bench_function("flatten_nested", |b| b.iter(|| flatten(black_box(nested()))));
}

criterion_group!(benches, engine_benchmarks, flatten_benchmarks);
criterion_main!(benches);
