// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The public aggregation facade and its lifecycle handle.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hotpath_core::RecordSink;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::buffer::DeltaBuffer;
use crate::flusher::{FlushSignal, Flusher};

/// Builder for [`AccessAggregator`].
pub struct AccessAggregatorBuilder {
    flush_interval: Duration,
    shutdown_timeout: Duration,
    cancellation_token: Option<CancellationToken>,
}

impl Default for AccessAggregatorBuilder {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(120),
            shutdown_timeout: Duration::from_secs(30),
            cancellation_token: None,
        }
    }
}

impl AccessAggregatorBuilder {
    /// Create a builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how frequently buffered deltas are drained and published.
    ///
    /// Defaults to two minutes. A shorter interval narrows the window of
    /// counts lost on a crash at the cost of more publishes; the buffer
    /// itself stays small either way since it holds one slot per distinct
    /// entity, not per increment.
    pub fn flush_interval(mut self, flush_interval: Duration) -> Self {
        assert!(!flush_interval.is_zero(), "flush_interval must be non-zero");
        self.flush_interval = flush_interval;
        self
    }

    /// Sets how long the final shutdown flush may spend publishing before
    /// the remaining records are abandoned.
    ///
    /// Defaults to 30 seconds. Exceeding it loses the still-unpublished
    /// deltas of that last cycle rather than blocking process exit; some
    /// process managers kill services that don't exit promptly after a
    /// termination signal.
    pub fn shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        assert!(
            !shutdown_timeout.is_zero(),
            "shutdown_timeout must not be zero"
        );
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    /// Tie the flusher to a caller-owned shutdown signal, typically the
    /// process-wide token a termination-signal listener cancels.
    ///
    /// The flusher observes a child token, so shutting the aggregator
    /// down never cancels the caller's token.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Spawn the background flusher for `sink` and return the aggregator
    /// facade plus the handle controlling the flusher's lifecycle.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn build<S>(self, sink: S) -> (AccessAggregator, AggregatorHandle)
    where
        S: RecordSink + Send + 'static,
    {
        let cancel = self
            .cancellation_token
            .map(|token| token.child_token())
            .unwrap_or_default();
        let buffer = Arc::new(DeltaBuffer::default());
        let (flush_tx, flush_requests) = mpsc::unbounded_channel();
        let flusher = Flusher {
            buffer: Arc::clone(&buffer),
            sink,
            flush_interval: self.flush_interval,
            shutdown_timeout: self.shutdown_timeout,
            cancel: cancel.clone(),
            flush_requests,
        };
        let task = tokio::spawn(flusher.run());
        (
            AccessAggregator { buffer, flush_tx },
            AggregatorHandle {
                cancel,
                task: Some(task),
            },
        )
    }
}

/// Facade over the delta buffer and the background flusher.
///
/// Cloning is cheap and all clones feed the same buffer. Constructed via
/// [`AccessAggregatorBuilder`] and passed by reference (or clone) into
/// whatever owns the read path; there is deliberately no process-wide
/// instance.
#[derive(Clone)]
pub struct AccessAggregator {
    buffer: Arc<DeltaBuffer>,
    flush_tx: mpsc::UnboundedSender<FlushSignal>,
}

impl AccessAggregator {
    /// Fold `amount` accesses for `entity_id` into the pending delta.
    ///
    /// Fire and forget: never blocks on I/O and never reports an error.
    /// The increment is included in exactly one future flush cycle; a
    /// call racing an in-progress drain lands either in that cycle or the
    /// next, never both.
    pub fn increment_access(&self, entity_id: u64, amount: u64) {
        self.buffer.record(entity_id, amount);
    }

    /// Number of entities with a pending delta, for introspection.
    pub fn pending_entities(&self) -> usize {
        self.buffer.len()
    }

    /// Request an immediate flush cycle.
    ///
    /// The returned future completes once that cycle's publishes have
    /// finished, or immediately when the flusher has already stopped.
    pub fn flush_async(&self) -> impl Future<Output = ()> + Send + 'static {
        let (channel, done) = oneshot::channel();
        // a send error means the flusher is gone; the receiver then
        // completes right away
        let _ = self.flush_tx.send(FlushSignal::new(channel));
        async move {
            let _ = done.await;
        }
    }
}

/// Controls the background flusher's lifetime.
///
/// Dropping the handle requests cancellation without waiting for the
/// final drain. On the graceful path call [`shut_down`] instead, so the
/// process exits only after the last flush attempt completed or the
/// grace period elapsed.
///
/// [`shut_down`]: Self::shut_down
pub struct AggregatorHandle {
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl AggregatorHandle {
    /// Cancel the flusher and wait for its final bounded drain to finish.
    pub async fn shut_down(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if task.await.is_err() {
                tracing::error!("access flusher task panicked");
            }
        }
    }

    /// Drop the handle but let the flusher keep running until every
    /// [`AccessAggregator`] clone is dropped or the shared cancellation
    /// token fires.
    pub fn forget(mut self) {
        self.task = None;
    }

    /// The token the flusher observes. Cancelling it from anywhere
    /// triggers the final best-effort flush.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Drop for AggregatorHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.cancel.cancel();
        }
    }
}
