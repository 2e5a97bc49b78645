//! Redis-backed counter store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, trace};

use ::redis::aio::ConnectionManager;
use ::redis::{Client, RedisError, RedisResult, Script};

use super::{CounterStore, Increment, StorageError};
use crate::ratelimit::clock::{Clock, SystemClock};

/// Increments a counter and makes sure it carries the window TTL.
///
/// Returns `{count, pttl_ms}`. The TTL is only set when the key is new or
/// has lost its expiry, so later increments keep the original window end.
const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
local ttl = redis.call('PTTL', KEYS[1])
if count == 1 or ttl < 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
  ttl = tonumber(ARGV[1])
end
return {count, ttl}
"#;

/// Longest TTL handed to `PEXPIRE`. Redis rejects expiries that overflow
/// when added to its clock.
const MAX_EXPIRE_MS: u64 = 1 << 62;

/// Window length in milliseconds as accepted by `PEXPIRE`.
fn expire_millis(window: Duration) -> u64 {
    u64::try_from(window.as_millis())
        .unwrap_or(u64::MAX)
        .clamp(1, MAX_EXPIRE_MS)
}

/// Counter store backed by a Redis server.
///
/// Every round-trip is bounded by the operation timeout. A timeout or a
/// connection failure is returned as an error and never retried here.
#[derive(Clone)]
pub struct RedisStorage {
    connection: ConnectionManager,
    script: Arc<Script>,
    key_prefix: String,
    operation_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl RedisStorage {
    /// Connect to Redis, bounded by `connect_timeout`.
    pub async fn connect(
        url: &str,
        key_prefix: impl Into<String>,
        connect_timeout: Duration,
        operation_timeout: Duration,
    ) -> Result<Self, StorageError> {
        let client = Client::open(url).map_err(|e| StorageError::Connection(e.to_string()))?;

        let connection = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StorageError::Timeout(connect_timeout))?
            .map_err(map_redis_error)?;

        info!(
            timeout_ms = operation_timeout.as_millis() as u64,
            "Connected to Redis counter store"
        );

        Ok(Self::from_connection(connection, key_prefix, operation_timeout))
    }

    /// Wrap an existing connection manager.
    pub fn from_connection(
        connection: ConnectionManager,
        key_prefix: impl Into<String>,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            connection,
            script: Arc::new(Script::new(INCREMENT_SCRIPT)),
            key_prefix: key_prefix.into(),
            operation_timeout,
            clock: Arc::new(SystemClock),
        }
    }

    /// The fully prefixed Redis key for a storage key.
    pub fn redis_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }
}

impl std::fmt::Debug for RedisStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStorage")
            .field("key_prefix", &self.key_prefix)
            .field("operation_timeout", &self.operation_timeout)
            .finish()
    }
}

#[async_trait]
impl CounterStore for RedisStorage {
    async fn increment(&self, key: &str, window: Duration) -> Result<Increment, StorageError> {
        let redis_key = self.redis_key(key);
        let window_ms = expire_millis(window);
        let mut connection = self.connection.clone();

        let invocation = async {
            let reply: RedisResult<(i64, i64)> = self
                .script
                .key(&redis_key)
                .arg(window_ms)
                .invoke_async(&mut connection)
                .await;
            reply
        };

        let (count, ttl_ms) = tokio::time::timeout(self.operation_timeout, invocation)
            .await
            .map_err(|_| StorageError::Timeout(self.operation_timeout))?
            .map_err(map_redis_error)?;

        let count = u64::try_from(count)
            .map_err(|_| StorageError::InvalidResponse(format!("negative count {}", count)))?;
        if ttl_ms < 0 {
            return Err(StorageError::InvalidResponse(format!(
                "key {} has no expiry",
                redis_key
            )));
        }

        let reset_at = self
            .clock
            .now()
            .checked_add_signed(chrono::Duration::milliseconds(ttl_ms))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        trace!(key = %redis_key, count = count, ttl_ms = ttl_ms, "Incremented Redis counter");

        Ok(Increment { count, reset_at })
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

fn map_redis_error(err: RedisError) -> StorageError {
    if err.is_timeout()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_io_error()
    {
        StorageError::Connection(err.to_string())
    } else {
        StorageError::Command(err.to_string())
    }
}
