//! Core types and the batching engine for streaming ML inference
//!
//! This crate sits between a message transport and a pool of inference
//! workers. Samples arrive one at a time (possibly nested), are buffered in an
//! accumulator, and are released as flat batches either when a batch fills up
//! or when the stream goes quiet for longer than the idle timeout.

#![warn(missing_docs)]

pub mod accumulator;
pub mod allocation;
pub mod capability;
pub mod config;
pub mod engine;
pub mod error;
pub mod flatten;
pub mod publish;
pub mod rate;
pub mod sample;
pub mod worker;

// Re-export key types for convenience
pub use capability::{Capability, CapabilityKind, CapabilityRegistry, ModeSwitch, OperationalMode};
pub use config::{EngineConfig, Mode};
pub use engine::{Admission, Engine, EngineBuilder, Ingress};
pub use error::{Error, Result};
pub use flatten::flatten;
pub use publish::{CollectingPublisher, NullPublisher, Publisher};
pub use rate::{RateGauges, RateSnapshot};
pub use sample::{Batch, Children, Metadata, Record, Sample};
pub use worker::{Dispatcher, FnWorker, Worker, WorkerPool};

/// Sample buffering between producers and the extraction loop
pub mod buffering {
    pub use crate::accumulator::Accumulator;
    pub use crate::accumulator::BoundedAccumulator;
    pub use crate::accumulator::UnboundedAccumulator;
    pub use crate::engine::Flush;
    pub use crate::engine::FlushTrigger;
}

/// Origin-based task allocation
pub mod routing {
    pub use crate::allocation::OriginAllocator;
    pub use crate::allocation::DEFAULT_REAL_LOCATIONS;
    pub use crate::allocation::REAL_ORIGIN;
    pub use crate::allocation::SIM_ORIGIN;
}
