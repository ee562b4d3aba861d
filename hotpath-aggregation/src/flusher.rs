// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Background task that drains the delta buffer into the record sink.

use std::sync::Arc;
use std::time::Duration;

use hotpath_core::RecordSink;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::buffer::DeltaBuffer;

/// Acknowledgement for an explicitly requested flush.
pub(crate) struct FlushSignal {
    // drop the sender to signal that the cycle has completed
    #[allow(unused)]
    channel: oneshot::Sender<()>,
}

impl FlushSignal {
    pub(crate) fn new(channel: oneshot::Sender<()>) -> Self {
        Self { channel }
    }
}

/// Owns the sink and runs flush cycles until cancelled or until every
/// aggregator handle is gone. Cycles are serialized by construction: the
/// next trigger is only observed after the previous cycle's publishes
/// returned.
pub(crate) struct Flusher<S> {
    pub(crate) buffer: Arc<DeltaBuffer>,
    pub(crate) sink: S,
    pub(crate) flush_interval: Duration,
    pub(crate) shutdown_timeout: Duration,
    pub(crate) cancel: CancellationToken,
    pub(crate) flush_requests: mpsc::UnboundedReceiver<FlushSignal>,
}

impl<S: RecordSink> Flusher<S> {
    pub(crate) async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick of a tokio interval completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                request = self.flush_requests.recv() => {
                    match request {
                        Some(signal) => {
                            self.run_cycle().await;
                            drop(signal);
                        }
                        // every aggregator handle is gone; nothing can
                        // produce increments any more
                        None => break,
                    }
                }
                _ = self.cancel.cancelled() => break,
            }
        }

        tracing::info!("draining access buffer before shutdown");
        match tokio::time::timeout(self.shutdown_timeout, self.run_cycle()).await {
            Ok(()) => tracing::info!("access buffer drained"),
            Err(_) => {
                tracing::warn!("unable to drain access buffer while shutting down")
            }
        }
        // pending flush requests resolve when the receiver drops here
    }

    // One Idle → Draining → Publishing → Idle cycle. The drain swaps the
    // buffer inside its lock; publishing runs with no lock held.
    async fn run_cycle(&mut self) {
        for record in self.buffer.drain() {
            if let Err(err) = self.sink.publish(&record).await {
                tracing::error!(
                    entity_id = record.entity_id,
                    error = %err,
                    "failed to publish access record, dropping it"
                );
            }
        }
    }
}
