// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Fault-injecting sinks for exercising the flusher's failure policy.

use std::{
    future::Future,
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{FlushRecord, RecordSink, SinkError};

/// Sink that fails every publish for a fixed set of entity ids and records
/// the rest, so tests can assert that exactly the failed records were
/// dropped.
///
/// Cloning provides another reference to the same underlying sink.
#[derive(Debug)]
pub struct FailPointSink {
    delivered: Arc<Mutex<Vec<FlushRecord>>>,
    failures: Arc<AtomicU64>,
    fail_entities: Arc<[u64]>,
}

impl Clone for FailPointSink {
    fn clone(&self) -> Self {
        Self {
            delivered: Arc::clone(&self.delivered),
            failures: Arc::clone(&self.failures),
            fail_entities: Arc::clone(&self.fail_entities),
        }
    }
}

impl FailPointSink {
    /// Create a sink that rejects publishes for the given entity ids.
    pub fn failing_for(entities: impl IntoIterator<Item = u64>) -> Self {
        Self {
            delivered: Arc::default(),
            failures: Arc::default(),
            fail_entities: entities.into_iter().collect(),
        }
    }

    /// Snapshot of the records that were accepted, in publish order.
    pub fn delivered(&self) -> Vec<FlushRecord> {
        self.delivered.lock().unwrap().clone()
    }

    /// Number of publishes rejected so far.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl RecordSink for FailPointSink {
    fn publish(
        &mut self,
        record: &FlushRecord,
    ) -> impl Future<Output = Result<(), SinkError>> + Send {
        let result = if self.fail_entities.contains(&record.entity_id) {
            self.failures.fetch_add(1, Ordering::Relaxed);
            Err(SinkError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "fail point triggered",
            )))
        } else {
            self.delivered.lock().unwrap().push(*record);
            Ok(())
        };
        std::future::ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_only_configured_entities() {
        let mut sink = FailPointSink::failing_for([13]);

        assert!(sink.publish(&FlushRecord::new(13, 1)).await.is_err());
        sink.publish(&FlushRecord::new(21, 2)).await.unwrap();

        assert_eq!(sink.failures(), 1);
        assert_eq!(sink.delivered(), vec![FlushRecord::new(21, 2)]);
    }
}
