//! Ingestion and processing rate gauges
//!
//! Gauges are instantaneous point samples recomputed on every put and every
//! dispatch. They are observability only: nothing in the engine reads them to
//! make a decision.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::accumulator::lock;

/// Smallest elapsed time used as a divisor, keeps every rate finite
const MIN_ELAPSED: Duration = Duration::from_nanos(1);

/// Point-in-time view of the engine gauges and counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RateSnapshot {
    /// Leaf records per second measured on the most recent put
    pub ingestion_rate: f64,

    /// Drained samples per second of dispatch time, most recent batch
    pub processing_rate: f64,

    /// Admission of the oldest sample to the end of dispatch, most recent batch
    pub last_latency: Duration,

    /// Samples accepted into the accumulator
    pub samples_admitted: u64,

    /// Samples dropped by preprocessing capabilities
    pub samples_dropped: u64,

    /// Batches handed to the dispatcher
    pub batches_dispatched: u64,

    /// Leaf records handed to the dispatcher
    pub records_dispatched: u64,

    /// Batches whose dispatch failed
    pub dispatch_failures: u64,

    /// Batches whose egress publication failed
    pub publish_failures: u64,
}

struct Clock {
    last_put: Instant,
    last_latency: Duration,
}

/// Gauges shared by the ingestion path and the extraction loop
pub struct RateGauges {
    ingestion_rate: AtomicU64,
    processing_rate: AtomicU64,
    clock: Mutex<Clock>,
    samples_admitted: AtomicU64,
    samples_dropped: AtomicU64,
    batches_dispatched: AtomicU64,
    records_dispatched: AtomicU64,
    dispatch_failures: AtomicU64,
    publish_failures: AtomicU64,
}

impl RateGauges {
    /// Gauges whose first put is measured from now
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Gauges whose first put is measured from `start`
    pub fn starting_at(start: Instant) -> Self {
        Self {
            ingestion_rate: AtomicU64::new(0f64.to_bits()),
            processing_rate: AtomicU64::new(0f64.to_bits()),
            clock: Mutex::new(Clock {
                last_put: start,
                last_latency: Duration::ZERO,
            }),
            samples_admitted: AtomicU64::new(0),
            samples_dropped: AtomicU64::new(0),
            batches_dispatched: AtomicU64::new(0),
            records_dispatched: AtomicU64::new(0),
            dispatch_failures: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
        }
    }

    /// Record an admitted sample of `leaf_count` records; returns the new rate
    pub fn record_put(&self, leaf_count: usize, now: Instant) -> f64 {
        let mut clock = lock(&self.clock);
        let rate = per_second(leaf_count, now.saturating_duration_since(clock.last_put));
        clock.last_put = now;
        drop(clock);

        self.ingestion_rate.store(rate.to_bits(), Ordering::Relaxed);
        self.samples_admitted.fetch_add(1, Ordering::Relaxed);
        rate
    }

    /// Record a dispatched batch of `drained` entries flattened into
    /// `records` leaves; returns the new processing rate.
    ///
    /// The processing rate covers only `dispatch_start..now`; the end-to-end
    /// latency covers `oldest_admission..now`.
    pub fn record_dispatch(
        &self,
        drained: usize,
        records: usize,
        dispatch_start: Instant,
        now: Instant,
        oldest_admission: Instant,
    ) -> f64 {
        let rate = per_second(drained, now.saturating_duration_since(dispatch_start));
        self.processing_rate.store(rate.to_bits(), Ordering::Relaxed);
        lock(&self.clock).last_latency = now.saturating_duration_since(oldest_admission);

        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        self.records_dispatched
            .fetch_add(records as u64, Ordering::Relaxed);
        rate
    }

    /// Count a failed dispatch
    pub fn record_failure(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed publication
    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a sample dropped before admission
    pub fn record_drop(&self) {
        self.samples_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Most recent ingestion rate
    pub fn ingestion_rate(&self) -> f64 {
        f64::from_bits(self.ingestion_rate.load(Ordering::Relaxed))
    }

    /// Most recent processing rate
    pub fn processing_rate(&self) -> f64 {
        f64::from_bits(self.processing_rate.load(Ordering::Relaxed))
    }

    /// Copy every gauge and counter
    pub fn snapshot(&self) -> RateSnapshot {
        RateSnapshot {
            ingestion_rate: self.ingestion_rate(),
            processing_rate: self.processing_rate(),
            last_latency: lock(&self.clock).last_latency,
            samples_admitted: self.samples_admitted.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            records_dispatched: self.records_dispatched.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for RateGauges {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::cast_precision_loss)]
fn per_second(count: usize, elapsed: Duration) -> f64 {
    count as f64 / elapsed.max(MIN_ELAPSED).as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingestion_rate_after_one_second_gap() {
        let start = Instant::now();
        let gauges = RateGauges::starting_at(start);

        let rate = gauges.record_put(3, start + Duration::from_secs(1));
        assert!((rate - 3.0).abs() < 1e-9);
        assert!((gauges.ingestion_rate() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_ingestion_rate_uses_previous_put() {
        let start = Instant::now();
        let gauges = RateGauges::starting_at(start);

        gauges.record_put(1, start + Duration::from_secs(10));
        let rate = gauges.record_put(5, start + Duration::from_millis(10_500));
        assert!((rate - 10.0).abs() < 1e-9);
        assert_eq!(gauges.snapshot().samples_admitted, 2);
    }

    #[test]
    fn test_zero_elapsed_is_finite() {
        let now = Instant::now();
        let gauges = RateGauges::starting_at(now);

        assert!(gauges.record_put(4, now).is_finite());
        assert!(gauges.record_dispatch(4, 4, now, now, now).is_finite());
        assert!(gauges.record_dispatch(0, 0, now, now, now).is_finite());
    }

    #[test]
    fn test_dispatch_gauges() {
        let start = Instant::now();
        let gauges = RateGauges::starting_at(start);

        let dispatch_start = start + Duration::from_secs(2);
        let rate = gauges.record_dispatch(
            8,
            12,
            dispatch_start,
            dispatch_start + Duration::from_millis(500),
            start,
        );
        assert!((rate - 16.0).abs() < 1e-9);

        gauges.record_failure();
        gauges.record_publish_failure();
        gauges.record_drop();

        let snapshot = gauges.snapshot();
        assert_eq!(snapshot.batches_dispatched, 1);
        assert_eq!(snapshot.records_dispatched, 12);
        assert_eq!(snapshot.dispatch_failures, 1);
        assert_eq!(snapshot.publish_failures, 1);
        assert_eq!(snapshot.samples_dropped, 1);
        assert_eq!(snapshot.last_latency, Duration::from_millis(2500));
    }
}
