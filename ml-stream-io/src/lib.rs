//! Transport adapters and persistence helpers for ml-stream engines
//!
//! The core engine knows nothing about brokers or disks. This crate provides
//! the collaborators a deployment plugs around it: a consumer thread feeding
//! an engine ingress, an egress producer, in-memory topics for tests and
//! demos, an async stream bridge, and a folder of bincode blobs.

#![warn(missing_docs)]

mod error;

pub mod persist;
pub mod transport;

pub use error::{Error, Result};
pub use persist::BlobStore;
pub use transport::{
    forward_stream, ConsumerThread, ForwardStats, MemoryBroker, MessageSource, Producer,
    TopicPublisher, TopicSource,
};

// Re-export core types
pub use ml_stream_core::{Batch, Ingress, Publisher, Sample, Result as CoreResult};
