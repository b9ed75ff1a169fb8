//! Workers, worker pools and fan-out dispatch

use std::sync::Arc;

use tracing::warn;

use crate::error::{Error, Result};
use crate::publish::Publisher;
use crate::rate::RateGauges;
use crate::sample::Batch;

/// An opaque processing unit (typically an inference model) consuming batches
pub trait Worker<T>: Send + Sync {
    /// Kind identifier; every worker of a pool reports the same kind
    fn kind(&self) -> &str;

    /// Process one batch
    fn process(&self, batch: &Batch<T>) -> anyhow::Result<()>;
}

impl<T, W: Worker<T> + ?Sized> Worker<T> for Arc<W> {
    fn kind(&self) -> &str {
        (**self).kind()
    }

    fn process(&self, batch: &Batch<T>) -> anyhow::Result<()> {
        (**self).process(batch)
    }
}

impl<T, W: Worker<T> + ?Sized> Worker<T> for Box<W> {
    fn kind(&self) -> &str {
        (**self).kind()
    }

    fn process(&self, batch: &Batch<T>) -> anyhow::Result<()> {
        (**self).process(batch)
    }
}

/// A worker built from a closure
pub struct FnWorker<F> {
    kind: String,
    f: F,
}

impl<F> FnWorker<F> {
    /// Wrap `f` as a worker of the given kind
    pub fn new(kind: impl Into<String>, f: F) -> Self {
        Self { kind: kind.into(), f }
    }
}

impl<T, F> Worker<T> for FnWorker<F>
where
    F: Fn(&Batch<T>) -> anyhow::Result<()> + Send + Sync,
{
    fn kind(&self) -> &str {
        &self.kind
    }

    fn process(&self, batch: &Batch<T>) -> anyhow::Result<()> {
        (self.f)(batch)
    }
}

/// Ordered, homogeneous collection of workers.
///
/// The pool holds a single worker type, and construction rejects workers
/// reporting different kinds, so a mixed pool can never be built.
pub struct WorkerPool<W> {
    kind: String,
    workers: Vec<W>,
}

impl<W> WorkerPool<W> {
    /// Build a pool, checking it is non-empty and homogeneous
    pub fn new<T>(workers: Vec<W>) -> Result<Self>
    where
        W: Worker<T>,
    {
        let Some(first) = workers.first() else {
            return Err(Error::InvalidConfig("a worker pool needs at least one worker".into()));
        };

        let expected = first.kind();
        if let Some(other) = workers.iter().find(|w| w.kind() != expected) {
            return Err(Error::HeterogeneousWorkers {
                expected: expected.to_string(),
                found: other.kind().to_string(),
            });
        }

        Ok(Self {
            kind: expected.to_string(),
            workers,
        })
    }

    /// Kind shared by every worker of the pool
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Workers in registration order
    pub fn workers(&self) -> &[W] {
        &self.workers
    }

    /// Number of workers
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Always false for a constructed pool
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

/// Fans every batch out to all workers of a pool, then publishes it
pub struct Dispatcher<T, W> {
    pool: WorkerPool<W>,
    publisher: Option<Box<dyn Publisher<T>>>,
    gauges: Arc<RateGauges>,
}

impl<T, W: Worker<T>> Dispatcher<T, W> {
    /// Create a dispatcher over `pool`
    pub fn new(
        pool: WorkerPool<W>,
        publisher: Option<Box<dyn Publisher<T>>>,
        gauges: Arc<RateGauges>,
    ) -> Self {
        Self {
            pool,
            publisher,
            gauges,
        }
    }

    /// The worker pool
    pub fn pool(&self) -> &WorkerPool<W> {
        &self.pool
    }

    /// Invoke every worker, in registration order, with the same batch.
    ///
    /// The first worker failure is returned and the remaining workers are
    /// skipped. Publication happens only when every worker succeeded; a
    /// publication failure is logged and counted but not returned.
    pub fn distribute(&self, batch: &Batch<T>) -> Result<()> {
        for worker in self.pool.workers() {
            worker
                .process(batch)
                .map_err(|e| Error::worker(worker.kind(), e))?;
        }

        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.publish(batch) {
                warn!(batch = %batch.id(), error = %e, "Failed to publish processed batch");
                self.gauges.record_publish_failure();
            }
        }

        Ok(())
    }
}
