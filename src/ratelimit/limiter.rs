//! Core rate limiter implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::backend::RateLimiterBackend;
use super::buckets::{BucketLimit, BucketTable};
use super::clock::{Clock, SystemClock};
use super::counter::window_end;
use super::key::RateLimitKey;
use super::storage::{CounterStore, Increment};

/// The decision for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitResult {
    /// Bucket the request was counted against
    pub bucket: String,
    /// Quota of the resolved bucket
    pub limit: u64,
    /// Whether the request may proceed
    pub allowed: bool,
    /// Requests left in the current window
    pub remaining: u64,
    /// When the current window closes
    pub reset_at: DateTime<Utc>,
    /// Seconds to wait before retrying; zero when allowed
    pub retry_after_seconds: u64,
    /// Set when the store failed and the request was let through
    pub degraded: bool,
}

/// Fixed-window rate limiter over a pluggable counter store.
///
/// The limiter never fails: when the store errors or times out, the request
/// is allowed and the result is marked `degraded`.
pub struct RateLimiter {
    /// Counter storage
    store: Arc<dyn CounterStore>,
    /// Bucket name -> quota
    table: RwLock<BucketTable>,
    clock: Arc<dyn Clock>,
    /// Number of decisions made while the store was failing
    fail_open_events: AtomicU64,
}

impl RateLimiter {
    /// Create a rate limiter on the system clock.
    pub fn new(store: Arc<dyn CounterStore>, table: BucketTable) -> Self {
        Self::with_clock(store, table, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn CounterStore>,
        table: BucketTable,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            table: RwLock::new(table),
            clock,
            fail_open_events: AtomicU64::new(0),
        }
    }

    /// Check the rate limit for a client within a bucket, counting this request.
    pub async fn check_rate_limit(&self, bucket: &str, client_key: &str) -> RateLimitResult {
        let key = RateLimitKey::new(bucket, client_key);
        let limit = self.table.read().resolve(&key.bucket).clone();

        trace!(
            key = %key,
            max_requests = limit.max_requests,
            window_seconds = limit.window_seconds,
            "Checking rate limit"
        );

        match self.store.increment(&key.storage_key(), limit.window()).await {
            Ok(increment) => self.decide(&key, &limit, increment),
            Err(error) => {
                let events = self.fail_open_events.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    key = %key,
                    backend = self.store.backend_name(),
                    error = %error,
                    fail_open_events = events,
                    "Rate limit store unavailable, allowing request"
                );
                self.fail_open(&key, &limit)
            }
        }
    }

    fn decide(
        &self,
        key: &RateLimitKey,
        limit: &BucketLimit,
        increment: Increment,
    ) -> RateLimitResult {
        let now = self.clock.now();
        let allowed = increment.count <= limit.max_requests;
        let remaining = limit.max_requests.saturating_sub(increment.count);
        let retry_after_seconds = if allowed {
            0
        } else {
            retry_after_secs(now, increment.reset_at)
        };

        if !allowed {
            debug!(
                key = %key,
                count = increment.count,
                limit = limit.max_requests,
                retry_after = retry_after_seconds,
                "Rate limit exceeded"
            );
        }

        RateLimitResult {
            bucket: key.bucket.clone(),
            limit: limit.max_requests,
            allowed,
            remaining,
            reset_at: increment.reset_at,
            retry_after_seconds,
            degraded: false,
        }
    }

    fn fail_open(&self, key: &RateLimitKey, limit: &BucketLimit) -> RateLimitResult {
        RateLimitResult {
            bucket: key.bucket.clone(),
            limit: limit.max_requests,
            allowed: true,
            remaining: limit.max_requests,
            reset_at: window_end(self.clock.now(), limit.window()),
            retry_after_seconds: 0,
            degraded: true,
        }
    }

    /// Replace the bucket table.
    pub fn set_table(&self, table: BucketTable) {
        *self.table.write() = table;
    }

    /// Get a copy of the current bucket table.
    pub fn table(&self) -> BucketTable {
        self.table.read().clone()
    }

    /// Name of the store backing this limiter.
    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// How many requests were let through because the store failed.
    pub fn fail_open_events(&self) -> u64 {
        self.fail_open_events.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("backend", &self.store.backend_name())
            .field("buckets", &self.table.read().len())
            .finish()
    }
}

#[async_trait]
impl RateLimiterBackend for RateLimiter {
    async fn check_rate_limit(&self, bucket: &str, client_key: &str) -> RateLimitResult {
        RateLimiter::check_rate_limit(self, bucket, client_key).await
    }
}

/// Whole seconds until `reset_at`, rounded up, and never zero for a denial.
fn retry_after_secs(now: DateTime<Utc>, reset_at: DateTime<Utc>) -> u64 {
    let millis = (reset_at - now).num_milliseconds().max(0) as u64;
    millis.div_ceil(1000).max(1)
}
