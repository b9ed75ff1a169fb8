//! Benchmarks for ml-stream engine components

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{ensure, Context, Result};
use ml_stream_core::{flatten, Batch, Engine, EngineConfig, FnWorker, Mode, Sample};
use serde::Serialize;

/// Benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Number of measured iterations
    pub iterations: usize,

    /// Warmup iterations
    pub warmup_iterations: usize,

    /// Samples put per iteration, across all producers
    pub samples: usize,

    /// Leaf records in each sample
    pub records_per_sample: usize,

    /// Engine batch size
    pub batch_size: usize,

    /// Concurrent producer threads
    pub producers: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            warmup_iterations: 2,
            samples: 10_000,
            records_per_sample: 1,
            batch_size: 32,
            producers: 1,
        }
    }
}

impl BenchConfig {
    /// Leaf records processed by one iteration
    pub fn records_per_iteration(&self) -> usize {
        self.samples * self.records_per_sample
    }
}

/// Benchmark result
#[derive(Debug, Clone, Serialize)]
pub struct BenchResult {
    /// Name of the benchmark
    pub name: String,

    /// Total time taken
    pub total_time: Duration,

    /// Average time per iteration
    pub avg_time: Duration,

    /// Min time per iteration
    pub min_time: Duration,

    /// Max time per iteration
    pub max_time: Duration,

    /// Throughput (records/second)
    pub throughput: f64,
}

/// Run `func` for the configured warmup and measured iterations
pub fn run_benchmark<F>(name: &str, config: &BenchConfig, func: F) -> Result<BenchResult>
where
    F: Fn() -> Result<()>,
{
    ensure!(config.iterations > 0, "at least one iteration is required");

    for _ in 0..config.warmup_iterations {
        func().with_context(|| format!("warmup of {name}"))?;
    }

    let mut times = Vec::with_capacity(config.iterations);
    let start_total = Instant::now();

    for _ in 0..config.iterations {
        let start = Instant::now();
        func().with_context(|| format!("iteration of {name}"))?;
        times.push(start.elapsed());
    }

    let total_time = start_total.elapsed();
    let avg_time = times.iter().sum::<Duration>() / u32::try_from(times.len())?;
    let min_time = times.iter().min().copied().unwrap_or_default();
    let max_time = times.iter().max().copied().unwrap_or_default();

    #[allow(clippy::cast_precision_loss)]
    let throughput = (config.iterations * config.records_per_iteration()) as f64
        / total_time.as_secs_f64().max(f64::EPSILON);

    Ok(BenchResult {
        name: name.to_string(),
        total_time,
        avg_time,
        min_time,
        max_time,
        throughput,
    })
}

fn sample(first: usize, records: usize) -> Sample<u64> {
    if records == 1 {
        return Sample::record(first as u64);
    }
    Sample::nested((first..first + records).map(|i| Sample::record(i as u64)).collect())
}

/// Put, batch and dispatch every sample through an engine with a no-op
/// worker, then shut it down
pub fn run_engine_once(mode: Mode, config: &BenchConfig) -> Result<()> {
    let engine_config = EngineConfig::default()
        .with_name("bench")
        .with_mode(mode)
        .with_batch_size(config.batch_size)
        .with_idle_timeout(Duration::from_millis(5))
        .with_poll_interval(Duration::from_millis(1));
    let worker = FnWorker::new("noop", |_batch: &Batch<u64>| Ok(()));
    let engine = Engine::start(engine_config, vec![worker])?;

    let producers = config.producers.max(1);
    thread::scope(|scope| -> Result<()> {
        let handles: Vec<_> = (0..producers)
            .map(|p| {
                let ingress = engine.ingress();
                let (samples, records) = (config.samples, config.records_per_sample);
                scope.spawn(move || -> Result<()> {
                    for i in (p..samples).step_by(producers) {
                        ingress.put(sample(i * records, records))?;
                    }
                    Ok(())
                })
            })
            .collect();

        for handle in handles {
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("producer thread panicked"))??;
        }
        Ok(())
    })?;

    let stats = engine.shutdown()?;
    ensure!(
        stats.dispatch_failures == 0,
        "{} batches failed",
        stats.dispatch_failures
    );
    Ok(())
}

/// Engine throughput for one mode
pub fn bench_engine(mode: Mode, config: &BenchConfig) -> Result<BenchResult> {
    let name = format!("Engine ({mode:?}, batch {})", config.batch_size);
    run_benchmark(&name, config, || run_engine_once(mode, config))
}

/// Flatten throughput on nested samples
pub fn bench_flatten(config: &BenchConfig) -> Result<BenchResult> {
    run_benchmark("Flatten", config, || {
        let samples: Vec<_> = (0..config.samples)
            .map(|i| sample(i * config.records_per_sample, config.records_per_sample))
            .collect();
        let records = flatten(samples);
        ensure!(records.len() == config.records_per_iteration(), "flatten lost records");
        Ok(())
    })
}
