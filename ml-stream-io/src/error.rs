//! Error types for transport and persistence adapters

use thiserror::Error;

/// Error type for transport and persistence adapters
#[derive(Error, Debug)]
pub enum Error {
    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] ml_stream_core::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary encoding error
    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// The other side of a channel or topic went away
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Async task failure
    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for transport and persistence adapters
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for ml_stream_core::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Core(inner) => inner,
            other => ml_stream_core::Error::Publish(other.to_string()),
        }
    }
}
