//! Buffering between the ingestion path and the extraction loop
//!
//! Two accumulators share the [`Accumulator`] contract:
//!
//! - [`BoundedAccumulator`] blocks producers once it holds `capacity` entries
//!   and enforces a completion barrier between drains (synchronous mode).
//! - [`UnboundedAccumulator`] never blocks producers (asynchronous mode).
//!
//! The accumulator is the only state shared between producers and the
//! extraction loop; every access goes through its own lock.

mod bounded;
mod unbounded;

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

pub use bounded::BoundedAccumulator;
pub use unbounded::UnboundedAccumulator;

use crate::config::Mode;
use crate::error::Result;
use crate::sample::Sample;

/// A buffered sample and the instant it was admitted
#[derive(Debug, Clone)]
pub struct Entry<T> {
    /// The sample as admitted (still nested)
    pub sample: Sample<T>,

    /// Admission instant
    pub admitted_at: Instant,
}

impl<T> Entry<T> {
    /// Wrap a sample admitted now
    pub fn now(sample: Sample<T>) -> Self {
        Self {
            sample,
            admitted_at: Instant::now(),
        }
    }
}

/// Buffering primitive shared by producers and the extraction loop
pub trait Accumulator<T>: Send + Sync {
    /// Admit one sample. Bounded accumulators block while full.
    fn put(&self, sample: Sample<T>) -> Result<()>;

    /// Current number of buffered entries
    fn len(&self) -> usize;

    /// Whether no entry is buffered
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum occupancy, `None` when unbounded
    fn capacity(&self) -> Option<usize>;

    /// Admission instant of the oldest buffered entry
    fn oldest_admission(&self) -> Option<Instant>;

    /// Remove up to `n` entries, oldest first
    fn drain(&self, n: usize) -> Vec<Entry<T>>;

    /// Mark `n` drained entries as fully processed
    fn acknowledge(&self, n: usize);

    /// Refuse further puts and wake every blocked producer
    fn close(&self);

    /// Whether [`close`](Accumulator::close) has been called
    fn is_closed(&self) -> bool;
}

/// Build the accumulator matching the configured mode
pub fn for_mode<T: Send + 'static>(mode: Mode, batch_size: usize) -> Box<dyn Accumulator<T>> {
    match mode {
        Mode::Synchronous => Box::new(BoundedAccumulator::new(batch_size)),
        Mode::Asynchronous => Box::new(UnboundedAccumulator::new()),
    }
}

/// Lock a mutex, recovering the data if a panicking thread poisoned it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
