//! The ingestion and batching engine
//!
//! An [`Engine`] owns one accumulator, one worker pool and one background
//! extraction thread. Producers deposit samples through [`Engine::put`] or a
//! cloned [`Ingress`]; the extraction loop drains full or timed-out batches,
//! flattens them and fans them out to every worker.
//!
//! ```no_run
//! use std::time::Duration;
//! use ml_stream_core::{Batch, Engine, EngineConfig, FnWorker, Mode, Sample};
//!
//! let config = EngineConfig::default()
//!     .with_mode(Mode::Asynchronous)
//!     .with_batch_size(8)
//!     .with_idle_timeout(Duration::from_millis(200));
//!
//! let worker = FnWorker::new("detector", |batch: &Batch<Vec<u8>>| {
//!     println!("{} frames", batch.len());
//!     Ok(())
//! });
//!
//! let engine = Engine::start(config, vec![worker])?;
//! engine.put(Sample::with_context(vec![0u8; 16], "camera-1"))?;
//! let stats = engine.shutdown()?;
//! # Ok::<(), ml_stream_core::Error>(())
//! ```

mod extraction;
mod trigger;


use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::channel::{self, Sender};
use tracing::{debug, info, warn};

pub use trigger::{Flush, FlushTrigger};

use crate::accumulator::{self, Accumulator};
use crate::capability::{Capability, CapabilityKind, CapabilityRegistry, OperationalMode};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::publish::Publisher;
use crate::rate::{RateGauges, RateSnapshot};
use crate::sample::Sample;
use crate::worker::{Dispatcher, Worker, WorkerPool};

use extraction::ExtractionLoop;

/// Outcome of handing a sample to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The sample is buffered and will be dispatched
    Accepted,

    /// A capability dropped the sample, or it held no record
    Dropped,
}

/// State shared by producers and the extraction loop
pub(crate) struct Shared<T> {
    config: EngineConfig,
    accumulator: Box<dyn Accumulator<T>>,
    capabilities: CapabilityRegistry<T>,
    gauges: Arc<RateGauges>,
}

impl<T> Shared<T> {
    /// The ingestion path: preprocess, admit, update the ingestion gauge
    fn put(&self, sample: Sample<T>) -> Result<Admission> {
        let Some(sample) = self.capabilities.preprocess(sample) else {
            self.gauges.record_drop();
            return Ok(Admission::Dropped);
        };

        let leaves = sample.leaf_count();
        if leaves == 0 {
            self.gauges.record_drop();
            return Ok(Admission::Dropped);
        }

        self.accumulator.put(sample)?;
        let rate = self.gauges.record_put(leaves, Instant::now());
        debug!(ingestion_rate = rate, "Admitted sample");
        Ok(Admission::Accepted)
    }
}

/// Cloneable producer handle, usable from transport threads
pub struct Ingress<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Ingress<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Ingress<T> {
    /// Deposit a sample; blocks under backpressure in synchronous mode
    pub fn put(&self, sample: Sample<T>) -> Result<Admission> {
        self.shared.put(sample)
    }

    /// Transport callback: like [`put`](Self::put) but logs failures instead
    /// of returning them
    pub fn on_sample(&self, sample: Sample<T>) {
        if let Err(e) = self.shared.put(sample) {
            warn!(engine = %self.shared.config.name, error = %e, "Sample rejected");
        }
    }
}

/// Builder for an [`Engine`] with optional capabilities and publisher
pub struct EngineBuilder<T> {
    config: EngineConfig,
    capabilities: CapabilityRegistry<T>,
    publisher: Option<Box<dyn Publisher<T>>>,
}

impl<T: Send + 'static> EngineBuilder<T> {
    /// Start building an engine with the given configuration
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            capabilities: CapabilityRegistry::new(),
            publisher: None,
        }
    }

    /// Attach a capability
    #[must_use]
    pub fn capability(mut self, capability: impl Capability<T> + 'static) -> Self {
        self.capabilities.register(capability);
        self
    }

    /// Replace the capability registry
    #[must_use]
    pub fn capabilities(mut self, capabilities: CapabilityRegistry<T>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Publish every successfully processed batch through `publisher`
    #[must_use]
    pub fn publisher(mut self, publisher: impl Publisher<T> + 'static) -> Self {
        self.publisher = Some(Box::new(publisher));
        self
    }

    /// Validate everything and spawn the extraction thread.
    ///
    /// Nothing is started when the configuration or the worker pool is
    /// rejected.
    pub fn start<W>(self, workers: Vec<W>) -> Result<Engine<T>>
    where
        W: Worker<T> + 'static,
    {
        let config = self.config;
        config.validate()?;

        let pool = WorkerPool::new(workers)?;
        if let Some(expected) = config.worker_kinds.first() {
            if expected != pool.kind() {
                return Err(Error::HeterogeneousWorkers {
                    expected: expected.clone(),
                    found: pool.kind().to_string(),
                });
            }
        }

        if pool.len() > 1 {
            info!(workers = pool.len(), kind = pool.kind(), "Provided multiple workers");
        }
        info!(
            engine = %config.name,
            mode = ?config.mode,
            capabilities = ?self.capabilities.kinds(),
            "Creating accumulator"
        );

        let gauges = Arc::new(RateGauges::new());
        let worker_kind = pool.kind().to_string();
        let dispatcher = Dispatcher::new(pool, self.publisher, Arc::clone(&gauges));

        let shared = Arc::new(Shared {
            accumulator: accumulator::for_mode(config.mode, config.batch_size),
            capabilities: self.capabilities,
            gauges,
            config,
        });

        let (shutdown_tx, shutdown_rx) = channel::bounded(1);
        let extraction = ExtractionLoop::new(Arc::clone(&shared), dispatcher, shutdown_rx);
        let handle = thread::Builder::new()
            .name(format!("{}-extraction", shared.config.name))
            .spawn(move || extraction.run())?;

        Ok(Engine {
            shared,
            worker_kind,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }
}

/// A running ingestion engine
pub struct Engine<T> {
    shared: Arc<Shared<T>>,
    worker_kind: String,
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Engine<T> {
    /// Start an engine without capabilities or publisher
    pub fn start<W>(config: EngineConfig, workers: Vec<W>) -> Result<Self>
    where
        W: Worker<T> + 'static,
    {
        EngineBuilder::new(config).start(workers)
    }

    /// Start building an engine
    pub fn builder(config: EngineConfig) -> EngineBuilder<T> {
        EngineBuilder::new(config)
    }
}

impl<T> Engine<T> {
    /// Deposit a sample; blocks under backpressure in synchronous mode
    pub fn put(&self, sample: Sample<T>) -> Result<Admission> {
        self.shared.put(sample)
    }

    /// A cloneable producer handle
    pub fn ingress(&self) -> Ingress<T> {
        Ingress {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Current gauges and counters
    pub fn stats(&self) -> RateSnapshot {
        self.shared.gauges.snapshot()
    }

    /// Number of buffered samples
    pub fn len(&self) -> usize {
        self.shared.accumulator.len()
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.shared.accumulator.is_empty()
    }

    /// The validated configuration
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Kind shared by every worker of the pool
    pub fn worker_kind(&self) -> &str {
        &self.worker_kind
    }

    /// First capability of the given kind, if any
    pub fn capability(&self, kind: CapabilityKind) -> Option<&dyn Capability<T>> {
        self.shared.capabilities.lookup(kind)
    }

    /// Forward an operational mode change to every capability
    pub fn update_operational_mode(&self, mode: &OperationalMode) {
        self.shared.capabilities.update_operational_mode(mode);
    }

    /// Whether the extraction thread is still running
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop admitting samples, flush the backlog if configured, and wait for
    /// the extraction thread to finish
    pub fn shutdown(mut self) -> Result<RateSnapshot> {
        self.stop()?;
        Ok(self.stats())
    }

    fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        self.shared.accumulator.close();
        if let Some(shutdown) = self.shutdown.take() {
            // The loop may already be gone; dropping the sender wakes it either way.
            let _ = shutdown.try_send(());
        }

        handle
            .join()
            .map_err(|_| Error::EngineStopped("extraction thread panicked".into()))
    }
}

impl<T> Drop for Engine<T> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(engine = %self.shared.config.name, error = %e, "Engine did not stop cleanly");
        }
    }
}
