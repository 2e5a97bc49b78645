//! HTTP surface: the decision endpoint and the middleware that guards the
//! WorldWeaver API.

mod classify;
mod headers;
mod identity;
mod middleware;
mod server;
mod service;

pub use classify::classify;
pub use headers::{
    apply_rate_limit_headers, too_many_requests, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING,
    X_RATELIMIT_RESET,
};
pub use identity::{client_key, AuthenticatedUser, FORWARDED_HEADERS};
pub use middleware::{rate_limit_middleware, RateLimitState};
pub use server::HttpServer;
pub use service::{router, CheckRequest};
