// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![doc = include_str!("../README.md")]
#![deny(missing_docs)]

pub use crate::cache::{HotKeyCache, HotKeyCacheBuilder};
pub use crate::store::ValueStore;
pub use crate::tracker::{AddOutcome, HotKeyTracker};

pub mod cache;
pub mod store;
pub mod tracker;
