// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end behavior of the aggregator: coalescing, flush triggers,
//! failure policy, shutdown.

use std::future::Future;
use std::time::Duration;

use hotpath_aggregation::AccessAggregatorBuilder;
use hotpath_core::test_sink::FailPointSink;
use hotpath_core::{FlushRecord, RecordSink, SinkError, VecRecordSink};
use tokio_util::sync::CancellationToken;

fn sorted(mut records: Vec<FlushRecord>) -> Vec<FlushRecord> {
    records.sort_by_key(|record| record.entity_id);
    records
}

#[tokio::test(start_paused = true)]
async fn timer_flush_publishes_one_consolidated_record_per_entity() {
    let sink = VecRecordSink::new();
    let (aggregator, handle) = AccessAggregatorBuilder::new()
        .flush_interval(Duration::from_secs(120))
        .build(sink.clone());

    aggregator.increment_access(42, 3);
    aggregator.increment_access(42, 4);
    aggregator.increment_access(7, 1);
    assert_eq!(aggregator.pending_entities(), 2);

    tokio::time::sleep(Duration::from_secs(121)).await;

    assert_eq!(
        sorted(sink.drain()),
        vec![FlushRecord::new(7, 1), FlushRecord::new(42, 7)]
    );
    assert_eq!(aggregator.pending_entities(), 0);

    // the next tick has nothing to publish
    tokio::time::sleep(Duration::from_secs(121)).await;
    assert!(sink.drain().is_empty());

    handle.shut_down().await;
}

#[tokio::test]
async fn explicit_flush_drains_exactly_once() {
    let sink = VecRecordSink::new();
    let (aggregator, handle) = AccessAggregatorBuilder::new().build(sink.clone());

    aggregator.increment_access(1, 5);
    aggregator.flush_async().await;
    assert_eq!(sink.drain(), vec![FlushRecord::new(1, 5)]);

    aggregator.flush_async().await;
    assert!(sink.drain().is_empty());

    handle.shut_down().await;
}

#[tokio::test]
async fn concurrent_increments_sum_exactly() {
    let sink = VecRecordSink::new();
    let (aggregator, handle) = AccessAggregatorBuilder::new().build(sink.clone());

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let aggregator = aggregator.clone();
            scope.spawn(move || {
                for _ in 0..1_000 {
                    aggregator.increment_access(99, 1);
                }
            });
        }
    });

    aggregator.flush_async().await;
    assert_eq!(sink.drain(), vec![FlushRecord::new(99, 8_000)]);

    handle.shut_down().await;
}

#[tokio::test]
async fn shutdown_runs_a_final_flush() {
    let sink = VecRecordSink::new();
    let (aggregator, handle) = AccessAggregatorBuilder::new().build(sink.clone());

    aggregator.increment_access(3, 2);
    handle.shut_down().await;

    assert_eq!(sink.drain(), vec![FlushRecord::new(3, 2)]);
}

#[tokio::test]
async fn external_cancellation_triggers_the_final_flush() {
    let token = CancellationToken::new();
    let sink = VecRecordSink::new();
    let (aggregator, handle) = AccessAggregatorBuilder::new()
        .cancellation_token(token.clone())
        .build(sink.clone());

    aggregator.increment_access(5, 5);
    token.cancel();
    handle.shut_down().await;

    assert_eq!(sink.drain(), vec![FlushRecord::new(5, 5)]);
}

#[tokio::test]
async fn failed_publish_drops_only_that_record() {
    let sink = FailPointSink::failing_for([13]);
    let (aggregator, handle) = AccessAggregatorBuilder::new().build(sink.clone());

    aggregator.increment_access(13, 4);
    aggregator.increment_access(21, 1);
    aggregator.flush_async().await;

    assert_eq!(sink.delivered(), vec![FlushRecord::new(21, 1)]);
    assert_eq!(sink.failures(), 1);

    // the loss is permanent for that cycle; later increments for the same
    // entity start from a clean slot
    aggregator.increment_access(13, 2);
    aggregator.flush_async().await;
    assert_eq!(sink.failures(), 2);

    handle.shut_down().await;
}

struct StuckSink;

impl RecordSink for StuckSink {
    fn publish(
        &mut self,
        _record: &FlushRecord,
    ) -> impl Future<Output = Result<(), SinkError>> + Send {
        std::future::pending()
    }
}

#[tokio::test(start_paused = true)]
async fn shutdown_abandons_publishes_after_the_grace_period() {
    let (aggregator, handle) = AccessAggregatorBuilder::new()
        .shutdown_timeout(Duration::from_secs(5))
        .build(StuckSink);

    aggregator.increment_access(1, 1);
    // must complete once the grace period elapses rather than hang
    handle.shut_down().await;
}
