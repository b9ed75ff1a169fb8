//! Egress producer with inline or background delivery

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Sender};
use ml_stream_core::{Batch, Mode, Publisher};
use tracing::{debug, warn};

enum Delivery<T> {
    Inline(Box<dyn Publisher<T>>),
    Background {
        queue: Option<Sender<Batch<T>>>,
        handle: Option<JoinHandle<()>>,
    },
}

/// Wraps a publisher and delivers batches either inline or from a
/// background thread.
///
/// In [`Mode::Synchronous`] a failed publication is returned to the caller. In
/// [`Mode::Asynchronous`] the batch is queued and failures are only logged;
/// both count towards [`failures`](Self::failures).
pub struct Producer<T> {
    delivery: Delivery<T>,
    failures: Arc<AtomicU64>,
}

impl<T: Clone + Send + 'static> Producer<T> {
    /// Wrap `publisher` with the delivery style of `mode`
    pub fn new(publisher: impl Publisher<T> + 'static, mode: Mode) -> crate::Result<Self> {
        let failures = Arc::new(AtomicU64::new(0));
        let publisher: Box<dyn Publisher<T>> = Box::new(publisher);

        let delivery = match mode {
            Mode::Synchronous => Delivery::Inline(publisher),
            Mode::Asynchronous => {
                let (tx, rx) = channel::unbounded::<Batch<T>>();
                let counter = Arc::clone(&failures);
                let handle = thread::Builder::new()
                    .name("producer".into())
                    .spawn(move || {
                        for batch in rx {
                            if let Err(e) = publisher.publish(&batch) {
                                counter.fetch_add(1, Ordering::Relaxed);
                                warn!(batch = %batch.id(), error = %e, "Asynchronous publish failed");
                            }
                        }
                        debug!("Producer queue drained");
                    })?;
                Delivery::Background {
                    queue: Some(tx),
                    handle: Some(handle),
                }
            }
        };

        Ok(Self { delivery, failures })
    }
}

impl<T> Producer<T> {
    /// Publications that failed so far
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Deliver everything still queued and stop the background thread
    pub fn close(mut self) -> u64 {
        self.finish();
        self.failures()
    }

    fn finish(&mut self) {
        if let Delivery::Background { queue, handle } = &mut self.delivery {
            queue.take();
            if let Some(handle) = handle.take() {
                if handle.join().is_err() {
                    warn!("Producer thread panicked");
                }
            }
        }
    }
}

impl<T: Clone + Send> Publisher<T> for Producer<T> {
    fn publish(&self, batch: &Batch<T>) -> ml_stream_core::Result<()> {
        match &self.delivery {
            Delivery::Inline(publisher) => publisher.publish(batch).map_err(|e| {
                self.failures.fetch_add(1, Ordering::Relaxed);
                e
            }),
            Delivery::Background { queue, .. } => queue
                .as_ref()
                .ok_or(ml_stream_core::Error::Closed)?
                .send(batch.clone())
                .map_err(|_| {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    ml_stream_core::Error::Publish("producer thread stopped".into())
                }),
        }
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ml_stream_core::{CollectingPublisher, Record};
    use std::time::Instant;
    use test_case::test_case;

    struct Rejecting;

    impl Publisher<u32> for Rejecting {
        fn publish(&self, _batch: &Batch<u32>) -> ml_stream_core::Result<()> {
            Err(ml_stream_core::Error::Publish("broker unavailable".into()))
        }
    }

    fn batch(sequence: u64) -> Batch<u32> {
        Batch::new(sequence, Instant::now(), vec![Record::new(1), Record::new(2)])
    }

    #[test_case(Mode::Synchronous ; "synchronous")]
    #[test_case(Mode::Asynchronous ; "asynchronous")]
    fn test_batches_reach_publisher_in_order(mode: Mode) {
        let sink = Arc::new(CollectingPublisher::new());
        let producer = Producer::new(Arc::clone(&sink), mode).unwrap();

        for sequence in 0..5 {
            producer.publish(&batch(sequence)).unwrap();
        }
        assert_eq!(producer.close(), 0);

        let sequences: Vec<_> = sink.batches().iter().map(Batch::sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_synchronous_failure_is_returned() {
        let producer = Producer::new(Rejecting, Mode::Synchronous).unwrap();
        assert!(producer.publish(&batch(0)).is_err());
        assert_eq!(producer.failures(), 1);
    }

    #[test]
    fn test_asynchronous_failure_is_counted() {
        let producer = Producer::new(Rejecting, Mode::Asynchronous).unwrap();
        producer.publish(&batch(0)).unwrap();
        producer.publish(&batch(1)).unwrap();
        assert_eq!(producer.close(), 2);
    }
}
