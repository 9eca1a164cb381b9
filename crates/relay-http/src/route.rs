//! Bucket key normalization
//!
//! Requests that share a server-side rate limit bucket map to the same key.
//! Snowflake segments collapse to `{id}` except the major parameter (the ID
//! right after a leading `guilds`, `channels` or `webhooks`), which splits
//! buckets per resource.

use reqwest::Method;
use serde::Serialize;
use std::fmt;

const MAJOR_RESOURCES: [&str; 3] = ["guilds", "channels", "webhooks"];

/// Normalized `METHOD:path` rate limit key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BucketKey(String);

impl BucketKey {
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<BucketKey> for String {
    fn from(key: BucketKey) -> Self {
        key.0
    }
}

fn is_id(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

/// Compute the bucket key for a request
#[must_use]
pub fn bucket_key(method: &Method, path: &str) -> BucketKey {
    let path = path.trim_start_matches('/');
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').collect();

    let mut normalized = Vec::with_capacity(segments.len());
    for (index, &segment) in segments.iter().enumerate() {
        let previous = index.checked_sub(1).map(|i| segments[i]);
        let part = if index == 1 && MAJOR_RESOURCES.contains(&segments[0]) {
            segment
        } else if previous == Some("reactions") {
            "{emoji}"
        } else if is_id(segment) {
            "{id}"
        } else {
            segment
        };
        normalized.push(part);
    }

    BucketKey(format!("{}:{}", method.as_str(), normalized.join("/")))
}
