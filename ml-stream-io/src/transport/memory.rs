//! In-process topics backed by crossbeam channels
//!
//! Subscribers of one topic compete for its messages, like members of a
//! single consumer group. Topics are created on first use.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use ml_stream_core::{Batch, Publisher, Sample};

use super::MessageSource;
use crate::error::{Error, Result};

struct Topic<T> {
    tx: Sender<Sample<T>>,
    rx: Receiver<Sample<T>>,
}

/// A set of named in-memory topics
pub struct MemoryBroker<T> {
    topics: Mutex<HashMap<String, Topic<T>>>,
}

impl<T> MemoryBroker<T> {
    /// A broker without topics
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
        }
    }

    fn channel(&self, topic: &str) -> (Sender<Sample<T>>, Receiver<Sample<T>>) {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = topics.entry(topic.to_string()).or_insert_with(|| {
            let (tx, rx) = channel::unbounded();
            Topic { tx, rx }
        });
        (entry.tx.clone(), entry.rx.clone())
    }

    /// Subscribe to `topic`
    pub fn subscribe(&self, topic: &str) -> TopicSource<T> {
        let (_, rx) = self.channel(topic);
        TopicSource {
            topic: topic.to_string(),
            rx,
            disconnected: false,
        }
    }

    /// A publisher that forwards every record of a batch to `topic`
    pub fn publisher(&self, topic: &str) -> TopicPublisher<T> {
        let (tx, _) = self.channel(topic);
        TopicPublisher {
            topic: topic.to_string(),
            tx,
        }
    }

    /// Send one sample to `topic`
    pub fn send(&self, topic: &str, sample: Sample<T>) -> Result<()> {
        let (tx, _) = self.channel(topic);
        tx.send(sample)
            .map_err(|_| Error::Disconnected(format!("topic {topic} is closed")))
    }

    /// Messages waiting on `topic`
    pub fn pending(&self, topic: &str) -> usize {
        self.channel(topic).1.len()
    }

    /// Forget `topic`; its subscribers disconnect once every publisher of
    /// the topic is dropped and the backlog is consumed
    pub fn close(&self, topic: &str) -> bool {
        self.topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(topic)
            .is_some()
    }

    /// Names of the known topics, sorted
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl<T> Default for MemoryBroker<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscription to one in-memory topic
pub struct TopicSource<T> {
    topic: String,
    rx: Receiver<Sample<T>>,
    disconnected: bool,
}

impl<T> TopicSource<T> {
    /// Topic name
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl<T: Send> MessageSource<T> for TopicSource<T> {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Sample<T>>> {
        match self.rx.recv_timeout(timeout) {
            Ok(sample) => Ok(Some(sample)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                self.disconnected = true;
                Ok(None)
            }
        }
    }

    fn is_disconnected(&self) -> bool {
        self.disconnected
    }
}

/// Publishes every record of a batch as its own sample on a topic
pub struct TopicPublisher<T> {
    topic: String,
    tx: Sender<Sample<T>>,
}

impl<T> TopicPublisher<T> {
    /// Topic name
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl<T: Clone + Send> Publisher<T> for TopicPublisher<T> {
    fn publish(&self, batch: &Batch<T>) -> ml_stream_core::Result<()> {
        for record in batch.records() {
            self.tx
                .send(Sample::Record(record.clone()))
                .map_err(|_| ml_stream_core::Error::Publish(format!("topic {} is closed", self.topic)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ml_stream_core::Record;
    use std::time::Instant;

    #[test]
    fn test_send_then_poll() {
        let broker = MemoryBroker::new();
        let mut source = broker.subscribe("frames");

        broker.send("frames", Sample::record(5u32)).unwrap();
        assert_eq!(broker.pending("frames"), 1);

        let sample = source.poll(Duration::from_millis(10)).unwrap().unwrap();
        assert!(matches!(sample, Sample::Record(r) if r.payload == 5));
        assert!(source.poll(Duration::from_millis(10)).unwrap().is_none());
        assert!(!source.is_disconnected());
    }

    #[test]
    fn test_topics_are_isolated() {
        let broker = MemoryBroker::new();
        let mut detections = broker.subscribe("detections");

        broker.send("frames", Sample::record(1u32)).unwrap();
        assert!(detections.poll(Duration::from_millis(10)).unwrap().is_none());
        assert_eq!(broker.topics(), vec!["detections".to_string(), "frames".to_string()]);
    }

    #[test]
    fn test_close_disconnects_after_backlog() {
        let broker = MemoryBroker::new();
        let mut source = broker.subscribe("frames");
        broker.send("frames", Sample::record(1u32)).unwrap();

        assert!(broker.close("frames"));
        assert!(!broker.close("frames"));

        assert!(source.poll(Duration::from_millis(10)).unwrap().is_some());
        assert!(source.poll(Duration::from_millis(10)).unwrap().is_none());
        assert!(source.is_disconnected());
    }

    #[test]
    fn test_publisher_splits_batches_into_records() {
        let broker = MemoryBroker::new();
        let mut source = broker.subscribe("results");
        let publisher = broker.publisher("results");
        assert_eq!(publisher.topic(), "results");

        let batch = Batch::new(0, Instant::now(), vec![Record::new(1u32), Record::new(2)]);
        publisher.publish(&batch).unwrap();

        let mut payloads = Vec::new();
        while let Some(Sample::Record(record)) = source.poll(Duration::from_millis(10)).unwrap() {
            payloads.push(record.payload);
        }
        assert_eq!(payloads, vec![1, 2]);
    }
}
