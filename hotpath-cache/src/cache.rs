// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The hot-key cache facade.

use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::store::ValueStore;
use crate::tracker::{AddOutcome, HotKeyTracker};

/// Builder for [`HotKeyCache`].
pub struct HotKeyCacheBuilder {
    hot_key_cnt: usize,
    local_cache: usize,
    auto_cache: bool,
    cache_interval: Duration,
    decay_shift: u32,
    cancellation_token: Option<CancellationToken>,
}

impl Default for HotKeyCacheBuilder {
    fn default() -> Self {
        Self {
            hot_key_cnt: 1024,
            local_cache: 1024,
            auto_cache: false,
            cache_interval: Duration::from_secs(60),
            decay_shift: 1,
            cancellation_token: None,
        }
    }
}

impl HotKeyCacheBuilder {
    /// Create a builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum number of keys tracked for popularity. Defaults to 1024.
    ///
    /// When the tracker is full, a new key is admitted only by evicting
    /// the current least-popular key, and only when the new key's
    /// increment strictly beats that key's score.
    pub fn hot_key_cnt(mut self, hot_key_cnt: usize) -> Self {
        assert!(hot_key_cnt > 0, "hot_key_cnt must be non-zero");
        self.hot_key_cnt = hot_key_cnt;
        self
    }

    /// Capacity of the local value store. Defaults to 1024.
    ///
    /// Independent of [`hot_key_cnt`](Self::hot_key_cnt); sizing it a
    /// little larger tolerates transient overlap while evictions race
    /// promotions.
    pub fn local_cache(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "local_cache capacity must be non-zero");
        self.local_cache = capacity;
        self
    }

    /// Enable the periodic refresh task that ages popularity scores down.
    /// Defaults to disabled.
    pub fn auto_cache(mut self, auto_cache: bool) -> Self {
        self.auto_cache = auto_cache;
        self
    }

    /// How often the refresh task ages scores, when
    /// [`auto_cache`](Self::auto_cache) is enabled. Defaults to 60
    /// seconds. This is also the upper bound on how stale a cache hit can
    /// be before its key must re-earn its slot.
    pub fn cache_interval(mut self, cache_interval: Duration) -> Self {
        assert!(
            !cache_interval.is_zero(),
            "cache_interval must be non-zero"
        );
        self.cache_interval = cache_interval;
        self
    }

    /// How many bits each refresh tick right-shifts every score by.
    /// Defaults to 1 (halving).
    ///
    /// Larger shifts forget history faster; a shift past the score width
    /// resets the tracker every tick. Entries that reach zero are dropped
    /// and their cached values invalidated.
    pub fn decay_shift(mut self, decay_shift: u32) -> Self {
        assert!(
            decay_shift > 0,
            "decay_shift of zero would make auto_cache a no-op"
        );
        self.decay_shift = decay_shift;
        self
    }

    /// Tie the refresh task to a caller-owned shutdown signal. The task
    /// observes a child token, so [`HotKeyCache::stop`] never cancels the
    /// caller's token.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Build the cache, spawning the refresh task if
    /// [`auto_cache`](Self::auto_cache) is enabled.
    ///
    /// # Panics
    /// Panics if `auto_cache` is enabled and this is called outside a
    /// tokio runtime.
    pub fn build<V: Send + 'static>(self) -> HotKeyCache<V> {
        let cancel = self
            .cancellation_token
            .map(|token| token.child_token())
            .unwrap_or_default();
        let shared = Arc::new(Shared {
            tracker: RwLock::new(HotKeyTracker::new(self.hot_key_cnt)),
            store: Mutex::new(ValueStore::new(self.local_cache)),
            decay_shift: self.decay_shift,
            cancel: cancel.clone(),
        });
        if self.auto_cache {
            tokio::spawn(refresh_loop(
                Arc::downgrade(&shared),
                self.cache_interval,
                cancel,
            ));
        }
        HotKeyCache { shared }
    }
}

struct Shared<V> {
    tracker: RwLock<HotKeyTracker>,
    store: Mutex<ValueStore<V>>,
    decay_shift: u32,
    cancel: CancellationToken,
}

impl<V> Shared<V> {
    fn refresh(&self) {
        let dropped = self.tracker.write().unwrap().decay(self.decay_shift);
        if dropped.is_empty() {
            return;
        }
        let mut store = self.store.lock().unwrap();
        for key in &dropped {
            store.delete(key);
        }
        tracing::debug!(dropped = dropped.len(), "aged out cold hot-key entries");
    }
}

// The task holds only a Weak reference so that dropping every cache
// handle ends it, the same way the background flusher stops once no
// appender is left.
async fn refresh_loop<V>(shared: Weak<Shared<V>>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick of a tokio interval completes immediately
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => {
                tracing::debug!("hot-key refresh task stopped");
                return;
            }
        }
        let Some(shared) = shared.upgrade() else {
            return;
        };
        shared.refresh();
    }
}

/// Facade combining the bounded popularity tracker with the local value
/// store.
///
/// Cloning is cheap and shares the same underlying state, so one cache can
/// be handed to every request handler. The tracker sits behind a
/// read/write lock (membership checks vastly outnumber updates) and the
/// store behind a mutex (an LRU read promotes recency); no lock is ever
/// held across I/O or another component's lock except in the fixed
/// tracker→store order.
pub struct HotKeyCache<V> {
    shared: Arc<Shared<V>>,
}

impl<V> Clone for HotKeyCache<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V: Clone> HotKeyCache<V> {
    /// Fetch the cached value for `key`.
    ///
    /// Returns `Some` only while `key` is tracked as hot *and* a value has
    /// been promoted for it. A hit says nothing about freshness relative
    /// to the source of truth; entries may be up to a refresh period old,
    /// and tolerating that is the caller's contract.
    pub fn get(&self, key: &str) -> Option<V> {
        if !self.shared.tracker.read().unwrap().contains(key) {
            return None;
        }
        self.shared.store.lock().unwrap().get(key).cloned()
    }
}

impl<V> HotKeyCache<V> {
    /// Report `incr` accesses to `key`, possibly admitting it into the
    /// tracked set. If admitting `key` evicts another key, the evicted
    /// key's cached value is removed as well: a value for an untracked
    /// key is meaningless.
    ///
    /// Never fails; a key that does not beat the current minimum at
    /// capacity is silently not tracked.
    pub fn add(&self, key: &str, incr: u32) {
        let outcome = self
            .shared
            .tracker
            .write()
            .unwrap()
            .add(key, incr, Instant::now());
        if let AddOutcome::Evicted(evicted) = outcome {
            self.shared.store.lock().unwrap().delete(&evicted);
        }
    }

    /// Report `incr` accesses to `key` and promote its materialized value
    /// into the local store.
    ///
    /// The value is written even when the popularity update is rejected at
    /// capacity: it stays unreachable through [`get`](Self::get) until the
    /// key is admitted, and the store's own LRU bound reclaims it
    /// otherwise.
    pub fn add_with_value(&self, key: &str, value: V, incr: u32) {
        let outcome = self
            .shared
            .tracker
            .write()
            .unwrap()
            .add(key, incr, Instant::now());
        let mut store = self.shared.store.lock().unwrap();
        if let AddOutcome::Evicted(evicted) = &outcome {
            store.delete(evicted);
        }
        store.put(key.to_owned(), value);
    }

    /// The `n` hottest keys with their scores, hottest first.
    pub fn hottest(&self, n: usize) -> Vec<(String, u64)> {
        self.shared.tracker.read().unwrap().hottest(n)
    }

    /// Number of keys currently tracked for popularity.
    pub fn tracked_keys(&self) -> usize {
        self.shared.tracker.read().unwrap().len()
    }

    /// Stop the refresh task, if one is running.
    ///
    /// Tracked entries and cached values stay readable; they just no
    /// longer age out. Idempotent.
    pub fn stop(&self) {
        self.shared.cancel.cancel();
    }
}
