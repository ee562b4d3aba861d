// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The unit of exchange between the aggregator and the durable sink.

use serde::{Deserialize, Serialize};

/// A consolidated access-count delta for a single entity.
///
/// One record is produced per entity per flush cycle. `delta` is the full
/// sum of increments accumulated since the previous cycle, not a running
/// total: the downstream consumer applies it as `count = count + delta`,
/// so records for the same entity may be delivered in any order (or more
/// than once, on an at-least-once queue) without corrupting the counter
/// beyond over-counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlushRecord {
    /// Identifier of the entity whose counter is being advanced.
    pub entity_id: u64,
    /// Sum of all increments reported for this entity during the window.
    pub delta: u64,
}

impl FlushRecord {
    /// Create a record for `entity_id` carrying `delta`.
    pub fn new(entity_id: u64, delta: u64) -> Self {
        Self { entity_id, delta }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_stable_field_names() {
        let json = serde_json::to_string(&FlushRecord::new(42, 7)).unwrap();
        assert_eq!(json, r#"{"entity_id":42,"delta":7}"#);
    }

    #[test]
    fn deserializes_consumer_side_payload() {
        let record: FlushRecord = serde_json::from_str(r#"{"entity_id":7,"delta":1}"#).unwrap();
        assert_eq!(record, FlushRecord::new(7, 1));
    }
}
