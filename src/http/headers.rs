//! Translation of rate limit decisions into HTTP responses.

use axum::http::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::ratelimit::RateLimitResult;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Set `X-RateLimit-*` headers, plus `Retry-After` on a denial.
///
/// `X-RateLimit-Reset` is the window end as unix seconds.
pub fn apply_rate_limit_headers(result: &RateLimitResult, headers: &mut HeaderMap) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(result.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(result.remaining));
    headers.insert(
        X_RATELIMIT_RESET,
        HeaderValue::from(result.reset_at.timestamp().max(0)),
    );

    if !result.allowed {
        headers.insert(RETRY_AFTER, HeaderValue::from(result.retry_after_seconds));
    }
}

/// Build the 429 response for a denied request.
pub fn too_many_requests(result: &RateLimitResult) -> Response {
    let body = json!({
        "error": "Too many requests",
        "bucket": result.bucket,
        "retry_after": result.retry_after_seconds,
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    apply_rate_limit_headers(result, response.headers_mut());
    response
}
