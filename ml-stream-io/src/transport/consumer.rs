//! Background consumer feeding an ingress callback

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Sender, TryRecvError};
use ml_stream_core::Sample;
use tracing::{info, info_span, warn};

use super::MessageSource;
use crate::error::{Error, Result};

/// A named thread polling one source until it disconnects or is stopped
pub struct ConsumerThread {
    name: String,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<u64>>,
}

impl ConsumerThread {
    /// Subscribe happens before this call; the thread starts polling
    /// immediately and hands every sample to `callback`.
    pub fn spawn<T, S, F>(
        name: impl Into<String>,
        mut source: S,
        poll_timeout: Duration,
        mut callback: F,
    ) -> Result<Self>
    where
        T: Send + 'static,
        S: MessageSource<T> + 'static,
        F: FnMut(Sample<T>) + Send + 'static,
    {
        if poll_timeout.is_zero() {
            return Err(Error::InvalidArgument("poll timeout must be positive".into()));
        }

        let name = name.into();
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let span_name = name.clone();

        let handle = thread::Builder::new()
            .name(format!("{name}-consumer"))
            .spawn(move || {
                let span = info_span!("consumer", source = %span_name);
                let _entered = span.enter();
                let mut delivered = 0u64;

                while !source.is_disconnected() {
                    match stop_rx.try_recv() {
                        Ok(()) | Err(TryRecvError::Disconnected) => break,
                        Err(TryRecvError::Empty) => {}
                    }

                    match source.poll(poll_timeout) {
                        Ok(Some(sample)) => {
                            callback(sample);
                            delivered += 1;
                        }
                        Ok(None) => {}
                        Err(Error::Disconnected(reason)) => {
                            info!(%reason, "Source disconnected");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "Poll failed");
                            // Back off for one poll period, still honouring stop.
                            if stop_rx.recv_timeout(poll_timeout).is_ok() {
                                break;
                            }
                        }
                    }
                }

                info!(delivered, "Consumer stopped");
                delivered
            })?;

        Ok(Self {
            name,
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Source name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the thread to stop after the current poll
    pub fn stop(&self) {
        if let Some(stop) = &self.stop {
            let _ = stop.try_send(());
        }
    }

    /// Whether the thread is still polling
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Wait for the thread to end; returns the number of delivered samples.
    ///
    /// Without a prior [`stop`](Self::stop) this waits for the source to
    /// disconnect.
    pub fn join(mut self) -> Result<u64> {
        self.wait()
    }

    fn wait(&mut self) -> Result<u64> {
        let Some(handle) = self.handle.take() else {
            return Ok(0);
        };
        handle
            .join()
            .map_err(|_| Error::Disconnected(format!("consumer {} panicked", self.name)))
    }
}

impl Drop for ConsumerThread {
    fn drop(&mut self) {
        self.stop.take();
        if let Err(e) = self.wait() {
            warn!(error = %e, "Consumer did not stop cleanly");
        }
    }
}
