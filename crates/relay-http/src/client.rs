//! Rate-limited REST client
//!
//! Every call goes through the same pipeline: bucket lookup, global gate,
//! bucket wait, HTTP exchange, header bookkeeping and 429 retry. Entity
//! returning helpers write their result into the cache when one is attached.

use relay_cache::Cache;
use relay_common::RestConfig;
use relay_core::{Channel, Guild, Member, Role, Snowflake, User};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

use crate::error::{ApiError, HttpError, HttpResult};
use crate::ratelimit::{BucketRegistry, BucketState, GlobalGate, RateLimitHeaders};
use crate::request::{form_encode, HttpRequest, RawResponse, Request};
use crate::route::{bucket_key, BucketKey};
use crate::transport::{HttpTransport, ReqwestTransport};

/// Session start limits from `GET /gateway/bot`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStartLimit {
    pub total: u32,
    pub remaining: u32,
    /// Milliseconds until the limit resets
    pub reset_after: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
}

fn default_max_concurrency() -> u32 {
    1
}

/// `GET /gateway/bot` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayBot {
    pub url: String,
    /// Recommended shard count
    pub shards: u32,
    pub session_start_limit: SessionStartLimit,
}

/// REST client with per-route and global rate limiting
pub struct RestClient {
    token: String,
    config: RestConfig,
    transport: Arc<dyn HttpTransport>,
    buckets: BucketRegistry,
    global: GlobalGate,
    cache: Option<Arc<Cache>>,
    closed: AtomicBool,
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("api_base", &self.config.api_base)
            .field("buckets", &self.buckets.len())
            .field("cached", &self.cache.is_some())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl RestClient {
    /// Create a client backed by reqwest
    pub fn new(token: impl Into<String>, config: RestConfig) -> HttpResult<Self> {
        let transport = ReqwestTransport::new(config.request_timeout)?;
        Ok(Self::with_transport(token, config, Arc::new(transport)))
    }

    /// Create a client over an arbitrary transport
    #[must_use]
    pub fn with_transport(
        token: impl Into<String>,
        config: RestConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            token: token.into(),
            buckets: BucketRegistry::new(config.bucket_idle_ttl),
            global: GlobalGate::new(config.global_requests_per_second),
            config,
            transport,
            cache: None,
            closed: AtomicBool::new(false),
        }
    }

    /// Attach the cache that entity results are written into
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn cache(&self) -> Option<&Arc<Cache>> {
        self.cache.as_ref()
    }

    /// Reject new requests; in-flight ones complete
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::info!("REST client closed");
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of live rate limit buckets
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Current limits of a bucket, if it exists and is not in use
    #[must_use]
    pub fn bucket_state(&self, key: &BucketKey) -> Option<BucketState> {
        self.buckets.get(key)?.peek()
    }

    /// Drop idle buckets now
    pub fn sweep_buckets(&self) -> usize {
        self.buckets.sweep(Instant::now())
    }

    // =========================================================================
    // Execution
    // =========================================================================

    fn build(&self, request: &Request) -> HttpResult<HttpRequest> {
        let mut url = format!(
            "{}/{}",
            self.config.api_base.trim_end_matches('/'),
            request.path.trim_start_matches('/')
        );
        if !request.query.is_empty() {
            url.push('?');
            url.push_str(&serde_urlencoded::to_string(&request.query)?);
        }

        let mut headers = vec![
            ("Authorization", format!("Bot {}", self.token)),
            ("User-Agent", self.config.user_agent.clone()),
        ];
        if let Some(reason) = &request.reason {
            headers.push(("X-Audit-Log-Reason", form_encode(reason)?));
        }

        let body = match &request.body {
            Some(body) => {
                headers.push(("Content-Type", "application/json".to_string()));
                Some(serde_json::to_vec(body)?)
            }
            None => None,
        };

        Ok(HttpRequest {
            method: request.method.clone(),
            url,
            headers,
            body,
        })
    }

    /// Execute a request under rate limiting
    ///
    /// Requests sharing a bucket are sent one at a time. A 429 blocks the
    /// bucket (or the global gate) for the advertised delay and the request
    /// is retried up to `max_retries` times.
    pub async fn execute(&self, request: Request) -> HttpResult<RawResponse> {
        if self.is_closed() {
            return Err(HttpError::Closed);
        }

        let key = bucket_key(&request.method, &request.path);
        let http_request = self.build(&request)?;
        self.buckets.maybe_sweep(Instant::now());

        let bucket = self.buckets.get_or_create(&key);
        let mut state = match request.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, bucket.acquire())
                .await
                .map_err(|_| HttpError::Timeout {
                    bucket: key.to_string(),
                })?,
            None => bucket.acquire().await,
        };
        let mut attempts = 0u32;

        let result = loop {
            self.global.wait(&key, request.deadline).await?;

            let now = Instant::now();
            state.refill(now);
            if let Some(wait) = state.wait_time(now) {
                if self.config.cancel_on_rate_limit {
                    return Err(HttpError::RateLimited {
                        bucket: key.to_string(),
                        retry_after: wait,
                    });
                }
                if request.deadline.is_some_and(|deadline| now + wait > deadline) {
                    return Err(HttpError::Timeout {
                        bucket: key.to_string(),
                    });
                }
                tracing::debug!(
                    bucket = %key,
                    wait_ms = wait.as_millis() as u64,
                    "Waiting for bucket reset"
                );
                tokio::time::sleep(wait).await;
                state.refill(Instant::now());
            }

            let response = self.transport.send(http_request.clone()).await?;
            let headers = RateLimitHeaders::parse(&response);
            state.update(&headers, Instant::now());

            if response.is_rate_limited() {
                attempts += 1;
                let delay = headers.retry_delay();
                tracing::warn!(
                    bucket = %key,
                    attempt = attempts,
                    global = headers.global,
                    retry_after_ms = delay.as_millis() as u64,
                    "Rate limited"
                );
                if headers.global {
                    self.global.block_for(delay);
                } else {
                    state.block_for(delay, Instant::now());
                }
                // The request reached the server, so failing fast is a sent error
                if self.config.cancel_on_rate_limit || attempts > self.config.max_retries {
                    break Err(HttpError::RetriesExhausted {
                        bucket: key.to_string(),
                        attempts,
                    });
                }
                continue;
            }

            break Ok(response);
        };
        drop(state);
        bucket.touch();

        let response = result?;
        if response.is_success() {
            tracing::trace!(bucket = %key, status = response.status, "Request completed");
            return Ok(response);
        }

        let status = response.status;
        Err(match serde_json::from_slice::<ApiError>(&response.body) {
            Ok(error) if !error.message.is_empty() => HttpError::Api { status, error },
            _ => HttpError::Status {
                status,
                body: response.text(),
            },
        })
    }

    /// Execute a request and decode the JSON response
    pub async fn execute_json<T: DeserializeOwned>(&self, request: Request) -> HttpResult<T> {
        self.execute(request).await?.json()
    }

    // =========================================================================
    // Convenience endpoints
    // =========================================================================

    /// Gateway URL and recommended shard count
    pub async fn gateway_bot(&self) -> HttpResult<GatewayBot> {
        self.execute_json(Request::get("/gateway/bot")).await
    }

    pub async fn channel(&self, channel_id: Snowflake) -> HttpResult<Channel> {
        let channel: Channel = self
            .execute_json(Request::get(format!("/channels/{channel_id}")))
            .await?;
        if let Some(cache) = &self.cache {
            cache.upsert_entity(channel.clone());
        }
        Ok(channel)
    }

    pub async fn guild(&self, guild_id: Snowflake) -> HttpResult<Guild> {
        let guild: Guild = self
            .execute_json(Request::get(format!("/guilds/{guild_id}")))
            .await?;
        if let Some(cache) = &self.cache {
            cache.upsert_entity(guild.clone());
        }
        Ok(guild)
    }

    pub async fn user(&self, user_id: Snowflake) -> HttpResult<User> {
        let user: User = self
            .execute_json(Request::get(format!("/users/{user_id}")))
            .await?;
        if let Some(cache) = &self.cache {
            cache.upsert_entity(user.clone());
        }
        Ok(user)
    }

    pub async fn guild_member(&self, guild_id: Snowflake, user_id: Snowflake) -> HttpResult<Member> {
        let mut member: Member = self
            .execute_json(Request::get(format!("/guilds/{guild_id}/members/{user_id}")))
            .await?;
        member.guild_id = guild_id;
        member.resolve_user_id();
        if let Some(cache) = &self.cache {
            cache.upsert_entity(member.clone());
        }
        Ok(member)
    }

    pub async fn guild_roles(&self, guild_id: Snowflake) -> HttpResult<Vec<Role>> {
        let mut roles: Vec<Role> = self
            .execute_json(Request::get(format!("/guilds/{guild_id}/roles")))
            .await?;
        for role in &mut roles {
            role.guild_id = guild_id;
        }
        if let Some(cache) = &self.cache {
            for role in &roles {
                cache.upsert_entity(role.clone());
            }
        }
        Ok(roles)
    }

    /// Post a text message; messages are not cached
    pub async fn create_message(
        &self,
        channel_id: Snowflake,
        content: impl Into<String>,
    ) -> HttpResult<Value> {
        let content: String = content.into();
        let request =
            Request::post(format!("/channels/{channel_id}/messages")).body(json!({ "content": content }));
        self.execute_json(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use relay_common::CacheMode;
    use std::collections::VecDeque;
    use tokio::time::Duration;

    #[derive(Default)]
    struct Scripted {
        responses: Mutex<VecDeque<RawResponse>>,
        sent: Mutex<Vec<HttpRequest>>,
    }

    impl Scripted {
        fn new(responses: Vec<RawResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> usize {
            self.sent.lock().len()
        }
    }

    #[async_trait]
    impl HttpTransport for Scripted {
        async fn send(&self, request: HttpRequest) -> HttpResult<RawResponse> {
            self.sent.lock().push(request);
            self.responses
                .lock()
                .pop_front()
                .ok_or_else(|| HttpError::Transport("script exhausted".into()))
        }
    }

    fn config() -> RestConfig {
        RestConfig {
            global_requests_per_second: 0,
            ..RestConfig::default()
        }
    }

    fn client(transport: Arc<Scripted>, config: RestConfig) -> RestClient {
        RestClient::with_transport("token", config, transport)
    }

    fn ok(body: &str) -> RawResponse {
        RawResponse::new(200).with_body(body.to_string())
    }

    #[tokio::test]
    async fn test_headers_and_url() {
        let transport = Scripted::new(vec![ok("{}")]);
        let client = client(transport.clone(), config());

        client
            .execute(
                Request::patch("/guilds/1/members/2")
                    .query("limit", 5)
                    .body(json!({"nick": "x"}))
                    .reason("rename spam"),
            )
            .await
            .unwrap();

        let sent = transport.sent.lock();
        let request = &sent[0];
        assert_eq!(request.url, "https://discord.com/api/v10/guilds/1/members/2?limit=5");
        assert_eq!(request.header("authorization"), Some("Bot token"));
        assert_eq!(request.header("x-audit-log-reason"), Some("rename+spam"));
        assert_eq!(request.header("content-type"), Some("application/json"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_bucket_blocks_until_reset() {
        let transport = Scripted::new(vec![
            ok("{}")
                .with_header("X-RateLimit-Limit", "1")
                .with_header("X-RateLimit-Remaining", "0")
                .with_header("X-RateLimit-Reset-After", "1.5"),
            ok("{}"),
        ]);
        let client = client(transport.clone(), config());

        client.execute(Request::get("/channels/1")).await.unwrap();
        let start = Instant::now();
        client.execute(Request::get("/channels/1")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(1500));
        assert_eq!(transport.sent(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_bucket_is_not_blocked() {
        let transport = Scripted::new(vec![
            ok("{}")
                .with_header("X-RateLimit-Remaining", "0")
                .with_header("X-RateLimit-Reset-After", "10"),
            ok("{}"),
        ]);
        let client = client(transport, config());

        client.execute(Request::get("/channels/1")).await.unwrap();
        let start = Instant::now();
        client.execute(Request::get("/channels/2")).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_on_rate_limit_fails_fast() {
        let transport = Scripted::new(vec![ok("{}")
            .with_header("X-RateLimit-Remaining", "0")
            .with_header("X-RateLimit-Reset-After", "5")]);
        let client = client(
            transport.clone(),
            RestConfig {
                cancel_on_rate_limit: true,
                ..config()
            },
        );

        client.execute(Request::get("/channels/1")).await.unwrap();
        let err = client.execute(Request::get("/channels/1")).await.unwrap_err();
        assert!(matches!(err, HttpError::RateLimited { .. }));
        assert!(!err.was_sent());
        assert_eq!(transport.sent(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_on_rate_limit_after_429_reports_sent() {
        let transport = Scripted::new(vec![
            RawResponse::new(429)
                .with_header("Retry-After", "2")
                .with_body(r#"{"message":"limited","retry_after":2.0,"global":false}"#),
            ok("{}"),
        ]);
        let client = client(
            transport.clone(),
            RestConfig {
                cancel_on_rate_limit: true,
                ..config()
            },
        );

        let err = client.execute(Request::get("/channels/1")).await.unwrap_err();
        assert!(matches!(err, HttpError::RetriesExhausted { attempts: 1, .. }));
        assert!(err.was_sent());
        assert_eq!(err.status(), Some(429));
        assert_eq!(transport.sent(), 1);

        // The bucket stays blocked for the advertised delay
        let err = client.execute(Request::get("/channels/1")).await.unwrap_err();
        assert!(matches!(err, HttpError::RateLimited { .. }));
        assert!(!err.was_sent());
        assert_eq!(transport.sent(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_before_reset_times_out() {
        let transport = Scripted::new(vec![ok("{}")
            .with_header("X-RateLimit-Remaining", "0")
            .with_header("X-RateLimit-Reset-After", "5")]);
        let client = client(transport.clone(), config());

        client.execute(Request::get("/channels/1")).await.unwrap();
        let err = client
            .execute(Request::get("/channels/1").timeout(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Timeout { .. }));
        assert_eq!(transport.sent(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let limited = || {
            RawResponse::new(429)
                .with_header("Retry-After", "1")
                .with_body(r#"{"message":"limited","retry_after":1.0,"global":false}"#)
        };
        let transport = Scripted::new(vec![limited(), limited(), limited()]);
        let client = client(
            transport.clone(),
            RestConfig {
                max_retries: 2,
                ..config()
            },
        );

        let err = client.execute(Request::get("/channels/1")).await.unwrap_err();
        assert!(matches!(err, HttpError::RetriesExhausted { attempts: 3, .. }));
        assert!(err.was_sent());
        assert_eq!(transport.sent(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_429_blocks_other_buckets() {
        let transport = Scripted::new(vec![
            RawResponse::new(429)
                .with_header("X-RateLimit-Global", "true")
                .with_header("Retry-After", "3"),
            ok("{}"),
            ok("{}"),
        ]);
        let client = client(transport.clone(), config());

        let start = Instant::now();
        client.execute(Request::get("/channels/1")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(3));
        client.execute(Request::get("/guilds/9")).await.unwrap();
        assert_eq!(transport.sent(), 3);
    }

    #[tokio::test]
    async fn test_error_bodies() {
        let transport = Scripted::new(vec![
            RawResponse::new(404).with_body(r#"{"code":10003,"message":"Unknown Channel"}"#),
            RawResponse::new(502).with_body("bad gateway"),
        ]);
        let client = client(transport.clone(), config());

        let err = client.execute(Request::get("/channels/1")).await.unwrap_err();
        match err {
            HttpError::Api { status, error } => {
                assert_eq!(status, 404);
                assert_eq!(error.code, 10003);
            }
            other => panic!("unexpected {other:?}"),
        }

        let err = client.execute(Request::get("/channels/1")).await.unwrap_err();
        assert!(matches!(err, HttpError::Status { status: 502, .. }));
        // Neither is retried
        assert_eq!(transport.sent(), 2);
    }

    #[tokio::test]
    async fn test_closed_client_rejects() {
        let transport = Scripted::new(vec![]);
        let client = client(transport.clone(), config());
        client.close();
        let err = client.execute(Request::get("/users/@me")).await.unwrap_err();
        assert!(matches!(err, HttpError::Closed));
        assert_eq!(transport.sent(), 0);
    }

    #[tokio::test]
    async fn test_channel_fetch_populates_cache() {
        let transport = Scripted::new(vec![ok(
            r#"{"id":"7","type":0,"guild_id":"1","name":"general"}"#,
        )]);
        let cache = Arc::new(Cache::with_mode(CacheMode::Immutable));
        let client = client(transport, config()).with_cache(cache.clone());

        let channel = client.channel(Snowflake::new(7)).await.unwrap();
        assert_eq!(channel.name.as_deref(), Some("general"));
        assert!(cache.channel(Snowflake::new(7)).is_ok());
    }

    #[tokio::test]
    async fn test_gateway_bot() {
        let transport = Scripted::new(vec![ok(
            r#"{"url":"wss://gateway.example","shards":4,"session_start_limit":{"total":1000,"remaining":999,"reset_after":14400000,"max_concurrency":1}}"#,
        )]);
        let client = client(transport, config());
        let bot = client.gateway_bot().await.unwrap();
        assert_eq!(bot.shards, 4);
        assert_eq!(bot.session_start_limit.remaining, 999);
    }
}
