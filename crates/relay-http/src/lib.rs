//! # relay-http
//!
//! Rate-limited REST client.
//!
//! ## Features
//!
//! - **Bucket routing**: requests map to `METHOD:path` keys with the major
//!   parameter kept literal
//! - **Per-bucket limits**: same-bucket requests are serialized and wait for
//!   the advertised reset
//! - **Global gate**: steady-state requests-per-second plus global 429 blocks
//! - **429 retry** up to a configured cap
//! - **Cache-aside**: entity helpers write results into an attached cache
//!
//! ## Example
//!
//! ```ignore
//! use relay_http::{Request, RestClient};
//!
//! let rest = RestClient::new(&config.token, config.rest.clone())?;
//! let bot = rest.gateway_bot().await?;
//! let response = rest.execute(Request::get("/users/@me")).await?;
//! ```

pub mod client;
pub mod error;
pub mod ratelimit;
pub mod request;
pub mod route;
pub mod transport;

pub use client::{GatewayBot, RestClient, SessionStartLimit};
pub use error::{ApiError, HttpError, HttpResult};
pub use ratelimit::{Bucket, BucketRegistry, BucketState, GlobalGate, RateLimitHeaders};
pub use request::{HttpRequest, RawResponse, Request};
pub use route::{bucket_key, BucketKey};
pub use transport::{HttpTransport, ReqwestTransport};

// Re-exported so callers can build requests without a direct reqwest dependency
pub use reqwest::Method;
