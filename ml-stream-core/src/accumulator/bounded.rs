//! Capacity-bounded accumulator used in synchronous mode

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Instant;

use super::{lock, Accumulator, Entry};
use crate::error::{Error, Result};
use crate::sample::Sample;

struct State<T> {
    entries: VecDeque<Entry<T>>,
    /// Entries handed out by the last drain and not yet acknowledged
    outstanding: usize,
    closed: bool,
}

/// Accumulator that holds at most `capacity` entries.
///
/// `put` blocks while the buffer is full. Each `drain` must be followed by
/// `acknowledge` for the same number of entries; a later drain waits until
/// the previous one has been fully acknowledged.
pub struct BoundedAccumulator<T> {
    capacity: usize,
    state: Mutex<State<T>>,
    /// Signalled when entries leave the buffer or it is closed
    not_full: Condvar,
    /// Signalled when entries arrive, are acknowledged, or the buffer is closed
    changed: Condvar,
}

impl<T> BoundedAccumulator<T> {
    /// Create an accumulator holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(State {
                entries: VecDeque::with_capacity(capacity),
                outstanding: 0,
                closed: false,
            }),
            not_full: Condvar::new(),
            changed: Condvar::new(),
        }
    }

    /// Number of drained entries still awaiting acknowledgement
    pub fn outstanding(&self) -> usize {
        lock(&self.state).outstanding
    }
}

impl<T: Send> Accumulator<T> for BoundedAccumulator<T> {
    fn put(&self, sample: Sample<T>) -> Result<()> {
        let mut state = lock(&self.state);
        while state.entries.len() >= self.capacity && !state.closed {
            state = self
                .not_full
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        if state.closed {
            return Err(Error::Closed);
        }

        state.entries.push_back(Entry::now(sample));
        drop(state);
        self.changed.notify_all();
        Ok(())
    }

    fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.capacity)
    }

    fn oldest_admission(&self) -> Option<Instant> {
        lock(&self.state).entries.front().map(|e| e.admitted_at)
    }

    /// Waits for the previous drain to be acknowledged, then for `n` entries
    /// (or for the buffer to close), and removes at most `n` of them.
    fn drain(&self, n: usize) -> Vec<Entry<T>> {
        let wanted = n.min(self.capacity);
        let mut state = lock(&self.state);
        while state.outstanding > 0
            || (state.entries.len() < wanted && !state.closed)
        {
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        let take = wanted.min(state.entries.len());
        let drained: Vec<_> = state.entries.drain(..take).collect();
        state.outstanding = drained.len();
        drop(state);

        self.not_full.notify_all();
        drained
    }

    fn acknowledge(&self, n: usize) {
        let mut state = lock(&self.state);
        state.outstanding = state.outstanding.saturating_sub(n);
        let settled = state.outstanding == 0;
        drop(state);

        if settled {
            self.changed.notify_all();
        }
    }

    fn close(&self) {
        lock(&self.state).closed = true;
        self.not_full.notify_all();
        self.changed.notify_all();
    }

    fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}

static_assertions::assert_impl_all!(BoundedAccumulator<Vec<u8>>: Send, Sync);
