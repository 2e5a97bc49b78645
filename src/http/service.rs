//! Rate limit decision endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ratelimit::{RateLimitResult, RateLimiterBackend};

/// Body of a check request.
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub bucket: String,
    #[serde(default)]
    pub client_key: String,
}

/// Build the service router.
///
/// - `POST /v1/ratelimit/check` counts a request and returns the decision
/// - `GET /healthz`
pub fn router<R: RateLimiterBackend + 'static>(limiter: Arc<R>) -> Router {
    Router::new()
        .route("/v1/ratelimit/check", post(check::<R>))
        .route("/healthz", get(healthz))
        .with_state(limiter)
}

/// Count one request and report whether it is allowed.
///
/// A denial is still a successful call; callers read `allowed`.
async fn check<R: RateLimiterBackend + 'static>(
    State(limiter): State<Arc<R>>,
    Json(request): Json<CheckRequest>,
) -> Result<Json<RateLimitResult>, (StatusCode, Json<Value>)> {
    if request.bucket.trim().is_empty() {
        warn!("Received rate limit check with empty bucket");
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "bucket is required" })),
        ));
    }

    let result = limiter
        .check_rate_limit(&request.bucket, &request.client_key)
        .await;

    debug!(
        bucket = %result.bucket,
        allowed = result.allowed,
        remaining = result.remaining,
        degraded = result.degraded,
        "Rate limit decision made"
    );

    Ok(Json(result))
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{BucketTable, MemoryStorage, RateLimiter};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        let limiter = RateLimiter::new(Arc::new(MemoryStorage::new()), BucketTable::builtin());
        router(Arc::new(limiter))
    }

    fn check_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/ratelimit/check")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_empty_bucket_rejected() {
        let response = app()
            .oneshot(check_request(r#"{"bucket": "", "client_key": "ip:1.2.3.4"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_valid_request_returns_decision() {
        let response = app()
            .oneshot(check_request(r#"{"bucket": "auth.login", "client_key": "ip:1.2.3.4"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["allowed"], true);
        assert_eq!(body["limit"], 5);
        assert_eq!(body["remaining"], 4);
        assert_eq!(body["degraded"], false);
    }

    #[tokio::test]
    async fn test_missing_client_key_is_counted_as_unknown() {
        let app = app();

        for expected in [4, 3] {
            let response = app
                .clone()
                .oneshot(check_request(r#"{"bucket": "auth.login"}"#))
                .await
                .unwrap();
            assert_eq!(json_body(response).await["remaining"], expected);
        }
    }

    #[tokio::test]
    async fn test_healthz() {
        let response = app()
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
