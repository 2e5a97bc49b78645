//! Rate limiter trait for abstracting limiter implementations.

use async_trait::async_trait;

use super::limiter::RateLimitResult;

/// Trait for rate limiter implementations.
///
/// The HTTP layer is written against this trait so it can be driven by the
/// store-backed `RateLimiter` or by a stand-in.
#[async_trait]
pub trait RateLimiterBackend: Send + Sync {
    /// Count one request from `client_key` against `bucket` and decide.
    async fn check_rate_limit(&self, bucket: &str, client_key: &str) -> RateLimitResult;
}
