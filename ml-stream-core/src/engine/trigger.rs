//! Flush trigger evaluation

use std::time::{Duration, Instant};

/// Decision taken by the extraction loop on one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    /// Nothing to do, wait for the next poll
    Idle,

    /// The accumulator holds a full batch; drain this many entries
    Full(usize),

    /// The idle window elapsed with a partial batch; drain this many entries
    Partial(usize),
}

/// Size and idle-timeout thresholds of the extraction loop
#[derive(Debug, Clone, Copy)]
pub struct FlushTrigger {
    batch_size: usize,
    idle_timeout: Duration,
}

impl FlushTrigger {
    /// Trigger for the given thresholds
    pub fn new(batch_size: usize, idle_timeout: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            idle_timeout,
        }
    }

    /// Decide what to drain.
    ///
    /// `window_start` is the later of the last fetch and the admission of the
    /// oldest buffered entry.
    pub fn evaluate(&self, occupancy: usize, window_start: Instant, now: Instant) -> Flush {
        if occupancy >= self.batch_size {
            Flush::Full(self.batch_size)
        } else if occupancy > 0 && now.saturating_duration_since(window_start) > self.idle_timeout {
            Flush::Partial(occupancy)
        } else {
            Flush::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, 0, Flush::Idle ; "empty")]
    #[test_case(0, 500, Flush::Idle ; "empty after timeout")]
    #[test_case(2, 10, Flush::Idle ; "partial within window")]
    #[test_case(2, 60, Flush::Partial(2) ; "partial after timeout")]
    #[test_case(4, 0, Flush::Full(4) ; "full")]
    #[test_case(9, 0, Flush::Full(4) ; "backlog drains one batch")]
    #[test_case(9, 60, Flush::Full(4) ; "full wins over timeout")]
    fn test_evaluate(occupancy: usize, elapsed_ms: u64, expected: Flush) {
        let trigger = FlushTrigger::new(4, Duration::from_millis(50));
        let start = Instant::now();
        let now = start + Duration::from_millis(elapsed_ms);
        assert_eq!(trigger.evaluate(occupancy, start, now), expected);
    }

    #[test]
    fn test_window_start_in_future_is_idle() {
        let trigger = FlushTrigger::new(4, Duration::from_millis(50));
        let now = Instant::now();
        assert_eq!(
            trigger.evaluate(1, now + Duration::from_millis(10), now),
            Flush::Idle
        );
    }
}
