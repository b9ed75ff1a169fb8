//! Benchmark runner and in-memory demo for ml-stream engines

use std::time::Duration;

use anyhow::Result;
use ml_stream_bench::{bench_engine, bench_flatten, BenchConfig, BenchResult};
use ml_stream_core::{Batch, Engine, EngineConfig, FnWorker, Mode, Sample};
use ml_stream_io::{ConsumerThread, MemoryBroker, MessageSource, Producer};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn print_result(result: &BenchResult) {
    println!("\nBenchmark: {}", result.name);
    println!("  Total time:   {:?}", result.total_time);
    println!("  Average time: {:?}", result.avg_time);
    println!("  Min time:     {:?}", result.min_time);
    println!("  Max time:     {:?}", result.max_time);
    println!("  Throughput:   {:.2} records/sec", result.throughput);
}

/// Camera frames flow through a topic into an engine whose results are
/// published to a second topic.
fn demo() -> Result<()> {
    let broker = MemoryBroker::<String>::new();

    let config = EngineConfig::default()
        .with_name("demo")
        .with_mode(Mode::Asynchronous)
        .with_batch_size(4)
        .with_idle_timeout(Duration::from_millis(50));
    let detector = FnWorker::new("detector", |batch: &Batch<String>| {
        info!(batch = batch.sequence(), frames = batch.len(), "Running detector");
        Ok(())
    });
    let producer = Producer::new(broker.publisher("detections"), Mode::Asynchronous)?;
    let engine = Engine::builder(config).publisher(producer).start(vec![detector])?;

    let ingress = engine.ingress();
    let consumer = ConsumerThread::spawn(
        "frames",
        broker.subscribe("frames"),
        Duration::from_millis(10),
        move |sample| ingress.on_sample(sample),
    )?;

    for camera in ["camera-1", "camera-2"] {
        for frame in 0..5 {
            broker.send("frames", Sample::with_context(format!("{camera}/frame-{frame}"), camera))?;
        }
    }

    std::thread::sleep(Duration::from_millis(200));
    consumer.stop();
    let delivered = consumer.join()?;
    let stats = engine.shutdown()?;

    let mut detections = broker.subscribe("detections");
    let mut published = 0;
    while detections.poll(Duration::from_millis(10))?.is_some() {
        published += 1;
    }

    println!("\n=== In-memory demo ===");
    println!("  Frames delivered:  {delivered}");
    println!("  Records published: {published}");
    println!("  Stats: {}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    println!("=== ML Stream Engine Benchmarks ===");

    let config = BenchConfig {
        iterations: 5,
        warmup_iterations: 1,
        ..BenchConfig::default()
    };

    for mode in [Mode::Synchronous, Mode::Asynchronous] {
        print_result(&bench_engine(mode, &config)?);
    }

    println!("\n=== Batch size sweep (asynchronous) ===");
    for batch_size in [1, 8, 64, 256] {
        let config = BenchConfig {
            iterations: 3,
            batch_size,
            ..config.clone()
        };
        let result = bench_engine(Mode::Asynchronous, &config)?;
        println!("\nBatch size: {batch_size}");
        println!("  Average time: {:?}", result.avg_time);
        println!("  Throughput:   {:.2} records/sec", result.throughput);
    }

    println!("\n=== Flatten ===");
    print_result(&bench_flatten(&BenchConfig {
        records_per_sample: 8,
        ..config
    })?);

    demo()
}
