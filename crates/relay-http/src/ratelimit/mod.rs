//! Rate limiting: per-route buckets and the global gate

mod bucket;
mod global;
mod headers;

pub use bucket::{Bucket, BucketRegistry, BucketState};
pub use global::GlobalGate;
pub use headers::RateLimitHeaders;
