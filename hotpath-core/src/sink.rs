// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Contains the [`RecordSink`] trait, the seam between the flusher and the
//! durable message broker that eventually applies deltas to storage.

use std::{
    fmt,
    future::Future,
    io,
    sync::{Arc, Mutex},
};

use crate::FlushRecord;

/// Error returned by [`RecordSink::publish`].
#[derive(Debug)]
#[non_exhaustive]
pub enum SinkError {
    /// The record could not be serialized into the sink's wire format.
    Serialize(serde_json::Error),
    /// The transport refused or failed the publish.
    Io(io::Error),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serialize(err) => fmt::Display::fmt(err, f),
            Self::Io(err) => fmt::Display::fmt(err, f),
        }
    }
}

impl std::error::Error for SinkError {}

impl From<serde_json::Error> for SinkError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialize(value)
    }
}

impl From<io::Error> for SinkError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Destination for consolidated access records.
///
/// A sink is bound to a single durable queue or topic when it is
/// constructed; `publish` delivers one record to that queue. The flusher
/// that drives a sink expects at-least-once delivery to a queue that a
/// downstream consumer drains into persistent counters. No ordering is
/// required between records of different entities.
///
/// Implementations should surface failures through the returned error
/// rather than retrying internally: the caller's failure policy (log and
/// discard) assumes `publish` completes in bounded time.
pub trait RecordSink {
    /// Publish one record to the sink's queue.
    fn publish(&mut self, record: &FlushRecord)
    -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// In-memory sink backed by a [`Vec`], designed for testing.
///
/// Cloning provides another reference to the same underlying sink.
///
/// # Example
/// ```
/// # use hotpath_core::{FlushRecord, RecordSink, VecRecordSink};
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut sink = VecRecordSink::new();
/// sink.publish(&FlushRecord::new(42, 7)).await.unwrap();
/// assert_eq!(sink.drain(), vec![FlushRecord::new(42, 7)]);
/// # }
/// ```
#[derive(Debug, Default)]
pub struct VecRecordSink(Arc<Mutex<Vec<FlushRecord>>>);

impl Clone for VecRecordSink {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl VecRecordSink {
    /// Create a new, empty [`VecRecordSink`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain all published records, returning them as an owned [`Vec`].
    ///
    /// The sink can still be used afterwards.
    pub fn drain(&self) -> Vec<FlushRecord> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    /// Snapshot of everything published so far, in publish order.
    pub fn records(&self) -> Vec<FlushRecord> {
        self.0.lock().unwrap().clone()
    }

    /// Returns true if any published record satisfies `predicate`.
    pub fn contains_record<F>(&self, predicate: F) -> bool
    where
        F: FnMut(&FlushRecord) -> bool,
    {
        self.0.lock().unwrap().iter().any(predicate)
    }
}

impl RecordSink for VecRecordSink {
    fn publish(
        &mut self,
        record: &FlushRecord,
    ) -> impl Future<Output = Result<(), SinkError>> + Send {
        self.0.lock().unwrap().push(*record);
        std::future::ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vec_sink_records_in_publish_order() {
        let mut sink = VecRecordSink::new();
        sink.publish(&FlushRecord::new(1, 10)).await.unwrap();
        sink.publish(&FlushRecord::new(2, 20)).await.unwrap();

        assert!(sink.contains_record(|r| r.entity_id == 2 && r.delta == 20));
        assert_eq!(
            sink.drain(),
            vec![FlushRecord::new(1, 10), FlushRecord::new(2, 20)]
        );
        assert!(!sink.contains_record(|_| true));
    }

    #[tokio::test]
    async fn vec_sink_clones_share_storage() {
        let mut sink = VecRecordSink::new();
        let observer = sink.clone();
        sink.publish(&FlushRecord::new(5, 1)).await.unwrap();
        assert_eq!(observer.records(), vec![FlushRecord::new(5, 1)]);
    }
}
