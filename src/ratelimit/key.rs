//! Rate limit key composition.

use super::buckets::DEFAULT_BUCKET;

/// Client key used when no identity could be derived for a request.
///
/// Every unidentified client shares this key, so that pool is limited as one.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// A key that uniquely identifies one client within one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    /// The bucket (request category) being limited
    pub bucket: String,
    /// The identity of the client being limited
    pub client_key: String,
}

impl RateLimitKey {
    /// Create a key, normalizing blank inputs instead of rejecting them.
    pub fn new(bucket: &str, client_key: &str) -> Self {
        let bucket = bucket.trim();
        let client_key = client_key.trim();

        Self {
            bucket: if bucket.is_empty() {
                DEFAULT_BUCKET.to_string()
            } else {
                bucket.to_string()
            },
            client_key: if client_key.is_empty() {
                UNKNOWN_CLIENT.to_string()
            } else {
                client_key.to_string()
            },
        }
    }

    /// The key under which the counter is stored.
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.bucket, self.client_key)
    }
}

impl std::fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.bucket, self.client_key)
    }
}
