//! Egress publication of processed batches

use std::sync::Mutex;

use crate::accumulator::lock;
use crate::error::Result;
use crate::sample::Batch;

/// Hands processed batches to an external transport
pub trait Publisher<T>: Send + Sync {
    /// Publish one batch
    fn publish(&self, batch: &Batch<T>) -> Result<()>;
}

impl<T, P: Publisher<T> + ?Sized> Publisher<T> for std::sync::Arc<P> {
    fn publish(&self, batch: &Batch<T>) -> Result<()> {
        (**self).publish(batch)
    }
}

/// A publisher that discards every batch
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPublisher;

impl<T> Publisher<T> for NullPublisher {
    fn publish(&self, _batch: &Batch<T>) -> Result<()> {
        Ok(())
    }
}

/// A publisher that keeps published batches in memory
pub struct CollectingPublisher<T> {
    /// The collected batches
    batches: Mutex<Vec<Batch<T>>>,

    /// Maximum number of batches to keep
    max_batches: Option<usize>,
}

impl<T: Clone> CollectingPublisher<T> {
    /// Create a collecting publisher with no limit
    pub fn new() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            max_batches: None,
        }
    }

    /// Create a collecting publisher keeping at most `max_batches` batches
    pub fn with_capacity(max_batches: usize) -> Self {
        Self {
            batches: Mutex::new(Vec::with_capacity(max_batches)),
            max_batches: Some(max_batches),
        }
    }

    /// Copy of the collected batches
    pub fn batches(&self) -> Vec<Batch<T>> {
        lock(&self.batches).clone()
    }

    /// Number of collected batches
    pub fn len(&self) -> usize {
        lock(&self.batches).len()
    }

    /// Whether nothing was published yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the collected batches, leaving the publisher empty
    pub fn take_batches(&self) -> Vec<Batch<T>> {
        std::mem::take(&mut *lock(&self.batches))
    }
}

impl<T: Clone> Default for CollectingPublisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send> Publisher<T> for CollectingPublisher<T> {
    fn publish(&self, batch: &Batch<T>) -> Result<()> {
        let mut batches = lock(&self.batches);
        if let Some(max) = self.max_batches {
            if batches.len() >= max {
                return Ok(());
            }
        }

        batches.push(batch.clone());
        Ok(())
    }
}
