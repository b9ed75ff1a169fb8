//! Error types for the ingestion engine

use thiserror::Error;

/// Result type for ingestion engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for ingestion engine operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration rejected at construction time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Workers of different kinds were placed in one pool
    #[error("Heterogeneous worker pool: expected kind `{expected}`, found `{found}`")]
    HeterogeneousWorkers {
        /// Kind of the first worker in the pool
        expected: String,
        /// First kind that did not match
        found: String,
    },

    /// A worker failed while processing a batch
    #[error("Worker `{worker}` failed: {source}")]
    Worker {
        /// Kind of the failing worker
        worker: String,
        /// Underlying failure
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Publishing a batch to the egress transport failed
    #[error("Publish error: {0}")]
    Publish(String),

    /// The accumulator no longer admits samples
    #[error("Accumulator closed")]
    Closed,

    /// The extraction loop has already terminated
    #[error("Engine stopped: {0}")]
    EngineStopped(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Wrap an opaque worker failure
    pub fn worker(worker: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Worker {
            worker: worker.into(),
            source: source.into(),
        }
    }
}
