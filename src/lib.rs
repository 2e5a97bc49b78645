//! Weaver rate limiting
//!
//! Fixed-window request rate limiting for the WorldWeaver API. Requests are
//! grouped into buckets (login attempts, invite creation, general traffic),
//! counted per client in a pluggable store (in-process or Redis), and the
//! limiter fails open when that store is unavailable.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
