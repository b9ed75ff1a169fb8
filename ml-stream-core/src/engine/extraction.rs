//! The long-lived extraction loop

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use crossbeam::channel::{Receiver, RecvTimeoutError, TryRecvError};
use tracing::{debug, error, info, info_span};

use super::trigger::{Flush, FlushTrigger};
use super::Shared;
use crate::error::{Error, Result};
use crate::flatten::flatten;
use crate::sample::Batch;
use crate::worker::{Dispatcher, Worker};

/// Drains the accumulator and dispatches batches until shutdown
pub(super) struct ExtractionLoop<T, W> {
    shared: Arc<Shared<T>>,
    dispatcher: Dispatcher<T, W>,
    trigger: FlushTrigger,
    shutdown: Receiver<()>,
    last_fetch: Instant,
    sequence: u64,
}

impl<T, W> ExtractionLoop<T, W>
where
    T: Send + 'static,
    W: Worker<T> + 'static,
{
    pub(super) fn new(
        shared: Arc<Shared<T>>,
        dispatcher: Dispatcher<T, W>,
        shutdown: Receiver<()>,
    ) -> Self {
        let trigger = FlushTrigger::new(shared.config.batch_size, shared.config.idle_timeout);
        Self {
            shared,
            dispatcher,
            trigger,
            shutdown,
            last_fetch: Instant::now(),
            sequence: 0,
        }
    }

    pub(super) fn run(mut self) {
        let config = self.shared.config.clone();
        let span = info_span!("extraction", engine = %config.name, mode = ?config.mode);
        let _entered = span.enter();

        info!(
            batch_size = config.batch_size,
            idle_timeout = ?config.idle_timeout,
            workers = self.dispatcher.pool().len(),
            "Starting extraction loop"
        );

        loop {
            match self.shutdown.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            let now = Instant::now();
            let window_start = self
                .shared
                .accumulator
                .oldest_admission()
                .map_or(self.last_fetch, |oldest| oldest.max(self.last_fetch));

            match self
                .trigger
                .evaluate(self.shared.accumulator.len(), window_start, now)
            {
                Flush::Full(amount) => self.extract(amount),
                Flush::Partial(amount) => {
                    info!(amount, "Timeout reached, flushing the remaining buffered samples");
                    self.extract(amount);
                }
                Flush::Idle => match self.shutdown.recv_timeout(config.poll_interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                },
            }
        }

        self.shared.accumulator.close();

        if config.flush_on_shutdown {
            let remaining = self.shared.accumulator.len();
            if remaining > 0 {
                info!(remaining, "Flushing buffered samples before shutdown");
            }
            while !self.shared.accumulator.is_empty() {
                self.extract(config.batch_size);
            }
        } else {
            let discarded = self.shared.accumulator.len();
            if discarded > 0 {
                info!(discarded, "Discarding buffered samples on shutdown");
            }
        }

        info!(batches = self.sequence, "Extraction loop stopped");
    }

    /// Drain up to `amount` entries, dispatch them as one batch and update the
    /// gauges. Dispatch failures, including worker panics, end here.
    fn extract(&mut self, amount: usize) {
        let accumulator = &self.shared.accumulator;
        let entries = accumulator.drain(amount);
        let Some(oldest) = entries.first().map(|e| e.admitted_at) else {
            return;
        };

        let drained = entries.len();
        self.last_fetch = Instant::now();
        let dispatch_start = self.last_fetch;

        let records = flatten(entries.into_iter().map(|e| e.sample).collect());
        let batch = Batch::new(self.sequence, oldest, records);
        self.sequence += 1;

        let result = self.dispatch(&batch);
        accumulator.acknowledge(drained);

        let rate = self.shared.gauges.record_dispatch(
            drained,
            batch.len(),
            dispatch_start,
            Instant::now(),
            oldest,
        );

        match result {
            Ok(()) => debug!(
                batch = %batch.id(),
                records = batch.len(),
                processing_rate = rate,
                "Dispatched batch"
            ),
            Err(e) => {
                self.shared.gauges.record_failure();
                error!(batch = %batch.id(), records = batch.len(), error = %e, "Error processing received data");
            }
        }
    }

    fn dispatch(&self, batch: &Batch<T>) -> Result<()> {
        panic::catch_unwind(AssertUnwindSafe(|| self.dispatcher.distribute(batch)))
            .unwrap_or_else(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "worker panicked".to_string());
                Err(Error::worker(
                    self.dispatcher.pool().kind(),
                    anyhow::anyhow!(message),
                ))
            })
    }
}
