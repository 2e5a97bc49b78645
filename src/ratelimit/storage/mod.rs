//! Counter storage backends.
//!
//! - **Memory**: process-local map, limits are per instance
//! - **Redis**: shared across instances through atomic `INCR` with a TTL
//!
//! Both implement [`CounterStore`], so the limiter never branches on which
//! one it was given.

mod memory;
mod redis;

pub use self::memory::MemoryStorage;
pub use self::redis::RedisStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::clock::SystemClock;
use crate::config::StorageConfig;

/// Outcome of a successful increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Increment {
    /// Requests recorded in the current window, including this one
    pub count: u64,
    /// When the current window closes
    pub reset_at: DateTime<Utc>,
}

/// Errors a counter store can report.
///
/// These are distinct from "limit exceeded": a store that fails never
/// reports a count.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("storage connection error: {0}")]
    Connection(String),
    #[error("storage command failed: {0}")]
    Command(String),
    #[error("unexpected storage response: {0}")]
    InvalidResponse(String),
}

/// Trait for counter storage backends.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically record one request against `key`.
    ///
    /// A missing or expired record starts a new window with `count = 1`;
    /// a live record is incremented and keeps its original `reset_at`.
    async fn increment(&self, key: &str, window: Duration) -> Result<Increment, StorageError>;

    /// Backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Pick the counter store for this process.
///
/// Redis is used when a URL is configured and reachable at startup.
/// Otherwise counts are kept in memory and limits apply per instance.
pub async fn open_store(config: &StorageConfig) -> Arc<dyn CounterStore> {
    if let Some(url) = config.redis_url.as_deref() {
        match RedisStorage::connect(
            url,
            config.key_prefix.clone(),
            config.connect_timeout(),
            config.operation_timeout(),
        )
        .await
        {
            Ok(storage) => return Arc::new(storage),
            Err(error) => warn!(
                error = %error,
                "Redis counter store unavailable, falling back to in-memory counters"
            ),
        }
    } else {
        info!("No Redis URL configured, using in-memory counters");
    }

    Arc::new(MemoryStorage::with_clock(
        Arc::new(SystemClock),
        config.sweep_interval(),
    ))
}
