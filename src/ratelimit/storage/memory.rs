//! Process-local counter store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::{CounterStore, Increment, StorageError};
use crate::ratelimit::clock::{Clock, SystemClock};
use crate::ratelimit::counter::{window_delta, CounterRecord};

/// Default minimum time between sweeps of expired records.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// In-memory counter store.
///
/// Counts are not shared between processes and do not survive a restart.
/// Each key is updated while holding its map shard, so concurrent
/// increments of one key never lose updates. Expired records are swept
/// lazily, at most once per sweep interval, on the increment path.
pub struct MemoryStorage {
    counters: DashMap<String, CounterRecord>,
    clock: Arc<dyn Clock>,
    sweep_interval: chrono::Duration,
    last_sweep: Mutex<DateTime<Utc>>,
}

impl MemoryStorage {
    /// Create a store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock), DEFAULT_SWEEP_INTERVAL)
    }

    /// Create a store with an explicit clock and sweep interval.
    pub fn with_clock(clock: Arc<dyn Clock>, sweep_interval: Duration) -> Self {
        let now = clock.now();
        Self {
            counters: DashMap::new(),
            clock,
            sweep_interval: window_delta(sweep_interval),
            last_sweep: Mutex::new(now),
        }
    }

    /// Current count for a storage key, if its window is still open.
    pub fn count(&self, key: &str) -> Option<u64> {
        let now = self.clock.now();
        self.counters
            .get(key)
            .filter(|record| !record.is_expired(now))
            .map(|record| record.count)
    }

    /// Drop every expired record. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.counters.len();
        self.counters.retain(|_, record| !record.is_expired(now));
        let removed = before.saturating_sub(self.counters.len());

        if removed > 0 {
            debug!(removed = removed, remaining = self.counters.len(), "Purged expired counters");
        }
        removed
    }

    /// Remove all counters.
    pub fn clear(&self) {
        self.counters.clear();
    }

    /// Number of stored records, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    fn maybe_sweep(&self, now: DateTime<Utc>) {
        {
            let mut last_sweep = match self.last_sweep.try_lock() {
                Some(guard) => guard,
                // Another caller is already sweeping
                None => return,
            };
            if now - *last_sweep < self.sweep_interval {
                return;
            }
            *last_sweep = now;
        }
        self.purge_expired();
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("counters", &self.counters.len())
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}

#[async_trait]
impl CounterStore for MemoryStorage {
    async fn increment(&self, key: &str, window: Duration) -> Result<Increment, StorageError> {
        let now = self.clock.now();
        self.maybe_sweep(now);

        let record = match self.counters.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                record.hit(now, window);
                *record
            }
            Entry::Vacant(entry) => *entry.insert(CounterRecord::start(now, window)),
        };

        trace!(key = %key, count = record.count, reset_at = %record.reset_at, "Incremented counter");

        Ok(Increment {
            count: record.count,
            reset_at: record.reset_at,
        })
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;

    const WINDOW: Duration = Duration::from_secs(60);

    fn store() -> (Arc<ManualClock>, MemoryStorage) {
        let clock = Arc::new(ManualClock::default());
        let storage = MemoryStorage::with_clock(clock.clone(), Duration::from_secs(300));
        (clock, storage)
    }

    #[tokio::test]
    async fn test_first_increment_creates_record() {
        let (clock, storage) = store();

        let result = storage.increment("auth.login:ip:1.2.3.4", WINDOW).await.unwrap();

        assert_eq!(result.count, 1);
        assert_eq!(result.reset_at, clock.now() + chrono::Duration::seconds(60));
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_increment_keeps_original_reset() {
        let (clock, storage) = store();

        let first = storage.increment("k", WINDOW).await.unwrap();
        clock.advance(Duration::from_secs(20));
        let second = storage.increment("k", WINDOW).await.unwrap();

        assert_eq!(second.count, 2);
        assert_eq!(second.reset_at, first.reset_at);
    }

    #[tokio::test]
    async fn test_expired_record_restarts() {
        let (clock, storage) = store();

        for _ in 0..3 {
            storage.increment("k", WINDOW).await.unwrap();
        }
        clock.advance(Duration::from_secs(61));

        let result = storage.increment("k", WINDOW).await.unwrap();
        assert_eq!(result.count, 1);
        assert_eq!(result.reset_at, clock.now() + chrono::Duration::seconds(60));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let (_clock, storage) = store();

        storage.increment("a", WINDOW).await.unwrap();
        storage.increment("a", WINDOW).await.unwrap();
        storage.increment("b", WINDOW).await.unwrap();

        assert_eq!(storage.count("a"), Some(2));
        assert_eq!(storage.count("b"), Some(1));
        assert_eq!(storage.count("c"), None);
    }

    #[tokio::test]
    async fn test_count_hides_expired_records() {
        let (clock, storage) = store();

        storage.increment("k", WINDOW).await.unwrap();
        clock.advance(WINDOW);

        assert_eq!(storage.count("k"), None);
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (clock, storage) = store();

        storage.increment("short", Duration::from_secs(10)).await.unwrap();
        storage.increment("long", Duration::from_secs(600)).await.unwrap();
        clock.advance(Duration::from_secs(11));

        assert_eq!(storage.purge_expired(), 1);
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.count("long"), Some(1));
    }

    #[tokio::test]
    async fn test_lazy_sweep_on_increment() {
        let (clock, storage) = store();

        storage.increment("stale", Duration::from_secs(10)).await.unwrap();
        clock.advance(Duration::from_secs(301));
        storage.increment("fresh", WINDOW).await.unwrap();

        assert_eq!(storage.len(), 1);
        assert_eq!(storage.count("fresh"), Some(1));
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let storage = Arc::new(MemoryStorage::new());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let storage = storage.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        storage.increment("shared", WINDOW).await.unwrap();
                    }
                })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            task.unwrap();
        }

        assert_eq!(storage.count("shared"), Some(400));
    }

    #[tokio::test]
    async fn test_clear() {
        let (_clock, storage) = store();

        storage.increment("k", WINDOW).await.unwrap();
        assert!(!storage.is_empty());

        storage.clear();
        assert!(storage.is_empty());
    }
}
