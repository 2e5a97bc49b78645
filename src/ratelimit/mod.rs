//! Rate limiting logic and state management.

mod backend;
mod buckets;
mod clock;
mod counter;
mod key;
mod limiter;
pub mod storage;

pub use backend::RateLimiterBackend;
pub use buckets::{BucketLimit, BucketTable, DEFAULT_BUCKET};
pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::CounterRecord;
pub use key::{RateLimitKey, UNKNOWN_CLIENT};
pub use limiter::{RateLimitResult, RateLimiter};
pub use storage::{open_store, CounterStore, Increment, MemoryStorage, RedisStorage, StorageError};
