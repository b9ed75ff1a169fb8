//! Bridge from async streams into a blocking engine ingress

use futures::{pin_mut, Stream, StreamExt};
use ml_stream_core::{Admission, Ingress, Sample};
use tracing::debug;

use crate::error::Result;

/// Counts of a finished [`forward_stream`] run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardStats {
    /// Samples admitted by the engine
    pub accepted: u64,

    /// Samples dropped by preprocessing or holding no record
    pub dropped: u64,
}

/// Forward every sample of `stream` into `ingress` until the stream ends.
///
/// Each put runs on the blocking pool, so a backpressured engine never stalls
/// the runtime. Stops at the first rejected sample, typically because the
/// engine shut down.
pub async fn forward_stream<T, S>(stream: S, ingress: Ingress<T>) -> Result<ForwardStats>
where
    T: Send + 'static,
    S: Stream<Item = Sample<T>>,
{
    pin_mut!(stream);
    let mut stats = ForwardStats::default();

    while let Some(sample) = stream.next().await {
        let ingress = ingress.clone();
        match tokio::task::spawn_blocking(move || ingress.put(sample)).await?? {
            Admission::Accepted => stats.accepted += 1,
            Admission::Dropped => stats.dropped += 1,
        }
    }

    debug!(accepted = stats.accepted, dropped = stats.dropped, "Stream ended");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use ml_stream_core::{Batch, Engine, EngineConfig, FnWorker, Mode};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use test_case::test_case;

    fn engine(mode: Mode, seen: Arc<Mutex<Vec<u32>>>) -> Engine<u32> {
        let worker = FnWorker::new("collector", move |batch: &Batch<u32>| {
            seen.lock().unwrap().extend(batch.payloads().copied());
            Ok(())
        });
        let config = EngineConfig::default()
            .with_mode(mode)
            .with_batch_size(3)
            .with_idle_timeout(Duration::from_millis(20))
            .with_poll_interval(Duration::from_millis(5));
        Engine::start(config, vec![worker]).unwrap()
    }

    #[test_case(Mode::Synchronous ; "synchronous")]
    #[test_case(Mode::Asynchronous ; "asynchronous")]
    #[tokio::test]
    async fn test_forwards_stream_in_order(mode: Mode) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let engine = engine(mode, Arc::clone(&seen));

        let samples = futures::stream::iter((0..20u32).map(Sample::record));
        let stats = forward_stream(samples, engine.ingress()).await.unwrap();
        assert_eq!(stats, ForwardStats { accepted: 20, dropped: 0 });

        engine.shutdown().unwrap();
        assert_eq!(*seen.lock().unwrap(), (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_empty_samples_are_dropped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let engine = engine(Mode::Asynchronous, seen);

        let samples = futures::stream::iter(vec![Sample::record(1), Sample::nested(vec![])]);
        let stats = forward_stream(samples, engine.ingress()).await.unwrap();
        assert_eq!(stats, ForwardStats { accepted: 1, dropped: 1 });
    }

    #[tokio::test]
    async fn test_stops_when_engine_is_closed() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let engine = engine(Mode::Asynchronous, seen);
        let ingress = engine.ingress();
        engine.shutdown().unwrap();

        let samples = futures::stream::iter(vec![Sample::record(1u32)]);
        let result = forward_stream(samples, ingress).await;
        assert!(matches!(result, Err(Error::Core(ml_stream_core::Error::Closed))));
    }
}
