//! Rate limit header parsing

use serde::Deserialize;
use tokio::time::Duration;

use crate::request::RawResponse;

/// Rate limit information carried by a response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitHeaders {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    /// Time until the bucket refills
    pub reset_after: Option<Duration>,
    /// Server-side bucket hash
    pub bucket: Option<String>,
    /// Set when the limit hit was the global one
    pub global: bool,
    /// Set on 429 responses
    pub retry_after: Option<Duration>,
}

/// Body of a 429 response
#[derive(Debug, Deserialize)]
struct RateLimitedBody {
    #[serde(default)]
    retry_after: Option<f64>,
    #[serde(default)]
    global: bool,
}

fn seconds(value: f64) -> Option<Duration> {
    (value.is_finite() && value >= 0.0).then(|| Duration::from_secs_f64(value))
}

impl RateLimitHeaders {
    /// Parse the headers (and for 429s the body) of a response
    ///
    /// `X-RateLimit-Reset-After` is preferred; the absolute
    /// `X-RateLimit-Reset` epoch is only used when it is missing.
    #[must_use]
    pub fn parse(response: &RawResponse) -> Self {
        let number = |name: &str| response.header(name).and_then(|v| v.trim().parse::<f64>().ok());

        let reset_after = number("x-ratelimit-reset-after")
            .and_then(seconds)
            .or_else(|| {
                let reset_at = number("x-ratelimit-reset")?;
                let now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
                seconds((reset_at - now).max(0.0))
            });

        let mut headers = Self {
            limit: response
                .header("x-ratelimit-limit")
                .and_then(|v| v.trim().parse().ok()),
            remaining: response
                .header("x-ratelimit-remaining")
                .and_then(|v| v.trim().parse().ok()),
            reset_after,
            bucket: response.header("x-ratelimit-bucket").map(str::to_string),
            global: response
                .header("x-ratelimit-global")
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            retry_after: number("retry-after").and_then(seconds),
        };

        if response.is_rate_limited() {
            if let Ok(body) = serde_json::from_slice::<RateLimitedBody>(&response.body) {
                headers.global |= body.global;
                if headers.retry_after.is_none() {
                    headers.retry_after = body.retry_after.and_then(seconds);
                }
            }
        }

        headers
    }

    /// How long a 429 asks the client to wait
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        self.retry_after
            .or(self.reset_after)
            .unwrap_or(Duration::from_secs(1))
    }
}
