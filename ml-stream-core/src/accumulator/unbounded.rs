//! Unbounded accumulator used in asynchronous mode

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use super::{lock, Accumulator, Entry};
use crate::error::{Error, Result};
use crate::sample::Sample;

struct State<T> {
    entries: VecDeque<Entry<T>>,
    closed: bool,
}

/// Accumulator that never blocks producers.
///
/// Memory grows with the backlog; live streams prefer this over stalling the
/// transport callback.
pub struct UnboundedAccumulator<T> {
    state: Mutex<State<T>>,
}

impl<T> UnboundedAccumulator<T> {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                entries: VecDeque::new(),
                closed: false,
            }),
        }
    }
}

impl<T> Default for UnboundedAccumulator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> Accumulator<T> for UnboundedAccumulator<T> {
    fn put(&self, sample: Sample<T>) -> Result<()> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(Error::Closed);
        }
        state.entries.push_back(Entry::now(sample));
        Ok(())
    }

    fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    fn capacity(&self) -> Option<usize> {
        None
    }

    fn oldest_admission(&self) -> Option<Instant> {
        lock(&self.state).entries.front().map(|e| e.admitted_at)
    }

    fn drain(&self, n: usize) -> Vec<Entry<T>> {
        let mut state = lock(&self.state);
        let take = n.min(state.entries.len());
        state.entries.drain(..take).collect()
    }

    fn acknowledge(&self, _n: usize) {}

    fn close(&self) {
        lock(&self.state).closed = true;
    }

    fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}

static_assertions::assert_impl_all!(UnboundedAccumulator<Vec<u8>>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_never_blocks() {
        let accumulator = UnboundedAccumulator::new();
        for i in 0..10_000u32 {
            accumulator.put(Sample::record(i)).unwrap();
        }
        assert_eq!(accumulator.len(), 10_000);
        assert_eq!(accumulator.capacity(), None);
    }

    #[test]
    fn test_drain_takes_oldest_first() {
        let accumulator = UnboundedAccumulator::new();
        for i in 0..5u32 {
            accumulator.put(Sample::record(i)).unwrap();
        }

        let drained = accumulator.drain(3);
        assert_eq!(drained.len(), 3);
        assert_eq!(accumulator.len(), 2);

        let rest = accumulator.drain(10);
        assert_eq!(rest.len(), 2);
        assert!(matches!(&rest[0].sample, Sample::Record(r) if r.payload == 3));
    }
}
