//! Rate limiting middleware for the WorldWeaver API.

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

use super::classify::classify;
use super::headers::{apply_rate_limit_headers, too_many_requests};
use super::identity::{client_key, AuthenticatedUser};
use crate::config::RateLimitingConfig;
use crate::ratelimit::RateLimiterBackend;

/// Middleware state.
pub struct RateLimitState<R: RateLimiterBackend> {
    pub limiter: Arc<R>,
    /// Honor forwarded-address headers when deriving client keys
    pub trust_proxy_headers: bool,
    /// Attach `X-RateLimit-*` headers to allowed responses
    pub informational_headers: bool,
}

impl<R: RateLimiterBackend> RateLimitState<R> {
    pub fn new(limiter: Arc<R>, config: &RateLimitingConfig) -> Self {
        Self {
            limiter,
            trust_proxy_headers: config.trust_proxy_headers,
            informational_headers: config.informational_headers,
        }
    }
}

impl<R: RateLimiterBackend> Clone for RateLimitState<R> {
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter.clone(),
            trust_proxy_headers: self.trust_proxy_headers,
            informational_headers: self.informational_headers,
        }
    }
}

/// Middleware that counts every request against its bucket and answers
/// 429 once the bucket's quota is spent.
pub async fn rate_limit_middleware<R>(
    State(state): State<RateLimitState<R>>,
    req: Request,
    next: Next,
) -> Response
where
    R: RateLimiterBackend + 'static,
{
    let bucket = classify(req.method(), req.uri().path());

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());
    let key = client_key(
        req.headers(),
        req.extensions().get::<AuthenticatedUser>(),
        peer,
        state.trust_proxy_headers,
    );

    let result = state.limiter.check_rate_limit(bucket, &key).await;

    if !result.allowed {
        debug!(
            bucket = bucket,
            client = %key,
            retry_after = result.retry_after_seconds,
            "Rejecting rate limited request"
        );
        return too_many_requests(&result);
    }

    let mut response = next.run(req).await;
    if state.informational_headers {
        apply_rate_limit_headers(&result, response.headers_mut());
    }
    response
}
