//! Bucket configuration table.
//!
//! A bucket is a category of requests (login attempts, invite creation,
//! general API traffic) that shares one quota. The table always carries the
//! `api.general` bucket, which any unconfigured bucket name falls back to.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, WeaverError};

/// Bucket used when a caller names a bucket the table does not know.
pub const DEFAULT_BUCKET: &str = "api.general";

/// Quota for a single bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketLimit {
    /// Requests allowed per window
    pub max_requests: u64,
    /// Window length in seconds
    pub window_seconds: u64,
    /// Optional description for this limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl BucketLimit {
    pub const fn new(max_requests: u64, window_seconds: u64) -> Self {
        Self {
            max_requests,
            window_seconds,
            name: None,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    fn validate(&self, bucket: &str) -> Result<()> {
        if self.max_requests == 0 {
            return Err(WeaverError::Config(format!(
                "bucket '{}': max_requests must be greater than zero",
                bucket
            )));
        }
        if self.window_seconds == 0 {
            return Err(WeaverError::Config(format!(
                "bucket '{}': window_seconds must be greater than zero",
                bucket
            )));
        }
        Ok(())
    }
}

/// On-disk shape of a bucket file.
#[derive(Debug, Default, Deserialize)]
struct BucketFile {
    #[serde(default)]
    default: Option<BucketLimit>,
    #[serde(default)]
    buckets: HashMap<String, BucketLimit>,
}

/// Mapping from bucket name to quota.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketTable {
    buckets: HashMap<String, BucketLimit>,
}

impl BucketTable {
    /// The buckets used by the WorldWeaver API.
    pub fn builtin() -> Self {
        let entries = [
            ("auth.login", BucketLimit::new(5, 60)),
            ("auth.register", BucketLimit::new(3, 3600)),
            ("auth.password", BucketLimit::new(3, 900)),
            ("invites.create", BucketLimit::new(10, 3600)),
            ("admin.seed", BucketLimit::new(2, 3600)),
            ("ai.generate", BucketLimit::new(20, 60)),
            ("uploads.create", BucketLimit::new(30, 60)),
            (DEFAULT_BUCKET, BucketLimit::new(100, 60)),
        ];

        Self {
            buckets: entries
                .into_iter()
                .map(|(name, limit)| (name.to_string(), limit))
                .collect(),
        }
    }

    /// A table holding only the given default bucket.
    pub fn with_default(default: BucketLimit) -> Self {
        let mut buckets = HashMap::new();
        buckets.insert(DEFAULT_BUCKET.to_string(), default);
        Self { buckets }
    }

    /// Load a bucket file layered over the builtin table.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading bucket configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a bucket document layered over the builtin table.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: BucketFile = serde_yaml::from_str(yaml).map_err(|e| {
            WeaverError::Config(format!("Failed to parse bucket config: {}", e))
        })?;

        let mut table = Self::builtin();

        if let Some(default) = file.default {
            default.validate(DEFAULT_BUCKET)?;
            table.buckets.insert(DEFAULT_BUCKET.to_string(), default);
        }

        for (name, limit) in file.buckets {
            limit.validate(&name)?;
            debug!(
                bucket = %name,
                max_requests = limit.max_requests,
                window_seconds = limit.window_seconds,
                "Configured bucket"
            );
            table.buckets.insert(name, limit);
        }

        Ok(table)
    }

    /// Add or replace a bucket.
    pub fn insert(&mut self, bucket: impl Into<String>, limit: BucketLimit) {
        self.buckets.insert(bucket.into(), limit);
    }

    /// Look up a bucket without falling back.
    pub fn get(&self, bucket: &str) -> Option<&BucketLimit> {
        self.buckets.get(bucket)
    }

    /// Look up a bucket, falling back to `api.general`.
    pub fn resolve(&self, bucket: &str) -> &BucketLimit {
        self.buckets
            .get(bucket)
            .or_else(|| self.buckets.get(DEFAULT_BUCKET))
            .unwrap_or(&FALLBACK_LIMIT)
    }

    /// Number of configured buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl Default for BucketTable {
    fn default() -> Self {
        Self::builtin()
    }
}

// Only reachable if a table was built without its default entry.
static FALLBACK_LIMIT: BucketLimit = BucketLimit::new(100, 60);
