// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![doc = include_str!("../README.md")]
#![deny(missing_docs)]

pub use crate::record::FlushRecord;
pub use crate::sink::{RecordSink, SinkError, VecRecordSink};

pub mod record;
pub mod sink;

/// Fault-injecting sinks for tests. This module is only available when the
/// `test-util` feature is enabled and makes no stability promises.
#[cfg(any(test, feature = "test-util"))]
pub mod test_sink;
