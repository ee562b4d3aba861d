// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The aggregator's sole mutable state: pending per-entity deltas.

use std::mem;
use std::sync::Mutex;

use hashbrown::HashMap;

use hotpath_core::FlushRecord;

/// Mutex-guarded mapping from entity ID to the increment sum accumulated
/// since the last drain.
///
/// The lock is held only for O(1) map mutation, never across publishing,
/// so writer latency stays bounded regardless of downstream sink latency.
#[derive(Debug, Default)]
pub(crate) struct DeltaBuffer {
    deltas: Mutex<HashMap<u64, u64>>,
}

impl DeltaBuffer {
    /// Fold `amount` into `entity_id`'s pending delta, creating the slot
    /// if absent.
    pub(crate) fn record(&self, entity_id: u64, amount: u64) {
        let mut deltas = self.deltas.lock().unwrap();
        let slot = deltas.entry(entity_id).or_insert(0);
        *slot = slot.saturating_add(amount);
    }

    /// Swap the buffer for an empty one and return the drained contents
    /// as flush records.
    ///
    /// The swap is a single critical section: a concurrent [`record`]
    /// lands either in the drained snapshot or in the fresh buffer, never
    /// in both and never nowhere.
    ///
    /// [`record`]: Self::record
    pub(crate) fn drain(&self) -> Vec<FlushRecord> {
        let drained = mem::take(&mut *self.deltas.lock().unwrap());
        drained
            .into_iter()
            .map(|(entity_id, delta)| FlushRecord { entity_id, delta })
            .collect()
    }

    /// Number of entities with a pending delta.
    pub(crate) fn len(&self) -> usize {
        self.deltas.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(mut records: Vec<FlushRecord>) -> Vec<FlushRecord> {
        records.sort_by_key(|record| record.entity_id);
        records
    }

    #[test]
    fn drain_consolidates_per_entity() {
        let buffer = DeltaBuffer::default();
        buffer.record(42, 3);
        buffer.record(42, 4);
        buffer.record(7, 1);

        assert_eq!(buffer.len(), 2);
        assert_eq!(
            sorted(buffer.drain()),
            vec![FlushRecord::new(7, 1), FlushRecord::new(42, 7)]
        );
    }

    #[test]
    fn drain_is_idempotent_on_an_empty_buffer() {
        let buffer = DeltaBuffer::default();
        buffer.record(1, 1);
        assert_eq!(buffer.drain().len(), 1);
        assert!(buffer.drain().is_empty());
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn concurrent_increments_are_never_lost() {
        let buffer = DeltaBuffer::default();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for i in 0..1_000 {
                        buffer.record(i % 4, 1);
                    }
                });
            }
        });

        let total: u64 = buffer.drain().iter().map(|record| record.delta).sum();
        assert_eq!(total, 8_000);
    }

    #[test]
    fn increments_racing_a_drain_land_in_exactly_one_cycle() {
        let buffer = DeltaBuffer::default();
        let mut drained = Vec::new();
        std::thread::scope(|scope| {
            let writer = scope.spawn(|| {
                for _ in 0..10_000 {
                    buffer.record(9, 1);
                }
            });
            while !writer.is_finished() {
                drained.extend(buffer.drain());
            }
        });
        drained.extend(buffer.drain());

        let total: u64 = drained.iter().map(|record| record.delta).sum();
        assert_eq!(total, 10_000);
    }
}
