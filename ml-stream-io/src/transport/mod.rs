//! Transport boundary between message brokers and engines
//!
//! An ingress side pulls samples from a [`MessageSource`] on a dedicated
//! [`ConsumerThread`] and hands them to an engine callback. An egress side
//! wraps any [`Publisher`](ml_stream_core::Publisher) in a [`Producer`] that
//! delivers inline or from a background thread.

mod async_bridge;
mod consumer;
mod memory;
mod producer;

use std::time::Duration;

use ml_stream_core::Sample;

use crate::error::Result;

pub use async_bridge::{forward_stream, ForwardStats};
pub use consumer::ConsumerThread;
pub use memory::{MemoryBroker, TopicPublisher, TopicSource};
pub use producer::Producer;

/// A subscription that yields samples one at a time
pub trait MessageSource<T>: Send {
    /// Wait up to `timeout` for the next sample.
    ///
    /// `Ok(None)` means nothing arrived in time.
    fn poll(&mut self, timeout: Duration) -> Result<Option<Sample<T>>>;

    /// Whether the source will never yield again
    fn is_disconnected(&self) -> bool;
}

impl<T, S: MessageSource<T> + ?Sized> MessageSource<T> for Box<S> {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Sample<T>>> {
        (**self).poll(timeout)
    }

    fn is_disconnected(&self) -> bool {
        (**self).is_disconnected()
    }
}
