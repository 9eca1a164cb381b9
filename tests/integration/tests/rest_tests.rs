//! End-to-end REST tests through the client
//!
//! Run with: cargo test -p integration-tests --test rest_tests

use anyhow::Result;
use integration_tests::*;
use relay_client::Client;
use relay_core::{ErrorKind, Snowflake};
use relay_http::{bucket_key, HttpError, Method, RawResponse, Request};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn client(http: &Arc<MockHttp>) -> Client {
    Client::with_transports(test_config(1), http.clone(), MockGateway::new(1))
}

// ============================================================================
// Rate limits
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_429_is_retried_after_retry_after() -> Result<()> {
    let http = MockHttp::new();
    http.push(
        RawResponse::new(429)
            .with_header("retry-after", "2")
            .with_body(json!({ "message": "You are being rate limited.", "retry_after": 2.0 }).to_string()),
    );
    http.push(
        RawResponse::new(200)
            .with_header("x-ratelimit-limit", "5")
            .with_header("x-ratelimit-remaining", "4")
            .with_header("x-ratelimit-reset-after", "1")
            .with_body(text_channel(20, 10, "general").to_string()),
    );
    let client = client(&http);

    let started = Instant::now();
    let channel = client.rest().channel(Snowflake::new(20)).await?;

    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(channel.name.as_deref(), Some("general"));
    assert_eq!(http.sent_count(), 2);
    // The retry's response headers replaced the 429 block
    let state = client
        .rest()
        .bucket_state(&bucket_key(&Method::GET, "/channels/20"))
        .expect("bucket exists");
    assert_eq!(state.limit, Some(5));
    assert_eq!(state.remaining, Some(4));
    assert!(state.reset_at.is_some_and(|reset_at| reset_at > Instant::now()));
    // Successful entity fetches land in the shared cache
    assert!(client.cache().channel(Snowflake::new(20)).is_ok());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_same_bucket_requests_wait_for_reset() -> Result<()> {
    let http = MockHttp::new();
    http.push(
        RawResponse::new(200)
            .with_header("x-ratelimit-limit", "1")
            .with_header("x-ratelimit-remaining", "0")
            .with_header("x-ratelimit-reset-after", "3")
            .with_body(text_channel(20, 10, "first").to_string()),
    );
    http.push_json(200, &text_channel(20, 10, "second"));
    let client = client(&http);
    let rest = Arc::clone(client.rest());

    let started = Instant::now();
    let (first, second) = tokio::join!(
        rest.execute(Request::get("/channels/20/messages/1")),
        rest.execute(Request::get("/channels/20/messages/2")),
    );
    first?;
    second?;

    // Both ids collapse into one bucket, so the second send waited out the reset
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert_eq!(rest.bucket_count(), 1);
    let sent = http.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|r| r.method == Method::GET));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_deadline_shorter_than_reset_times_out() -> Result<()> {
    let http = MockHttp::new();
    http.push(
        RawResponse::new(200)
            .with_header("x-ratelimit-remaining", "0")
            .with_header("x-ratelimit-reset-after", "10")
            .with_body("{}"),
    );
    let client = client(&http);

    client.rest().execute(Request::get("/guilds/10/roles")).await?;
    let err = client
        .rest()
        .execute(Request::get("/guilds/10/roles").timeout(Duration::from_secs(1)))
        .await
        .unwrap_err();

    assert!(matches!(err, HttpError::Timeout { .. }));
    assert_eq!(err.kind(), ErrorKind::Timeout);
    // Never reached the transport
    assert_eq!(http.sent_count(), 1);
    Ok(())
}

// ============================================================================
// Requests and lifecycle
// ============================================================================

#[tokio::test]
async fn test_requests_carry_auth_and_reason() -> Result<()> {
    let http = MockHttp::new();
    http.push_json(200, &json!({ "id": "1", "channel_id": "20", "content": "hi" }));
    let client = client(&http);

    client
        .rest()
        .execute(
            Request::post("/channels/20/messages")
                .body(json!({ "content": "hi" }))
                .reason("say hi"),
        )
        .await?;

    let sent = http.sent();
    assert_eq!(sent[0].method, Method::POST);
    assert!(sent[0].url.ends_with("/channels/20/messages"));
    assert_eq!(sent[0].header("authorization"), Some("Bot test-token"));
    assert_eq!(sent[0].header("x-audit-log-reason"), Some("say+hi"));
    assert_eq!(sent[0].header("content-type"), Some("application/json"));
    Ok(())
}

#[tokio::test]
async fn test_gateway_bot_fills_missing_connection_settings() -> Result<()> {
    let http = MockHttp::new();
    http.push_json(
        200,
        &json!({
            "url": "wss://bot.gateway.test",
            "shards": 2,
            "session_start_limit": {
                "total": 1000,
                "remaining": 999,
                "reset_after": 14_400_000,
                "max_concurrency": 1
            }
        }),
    );
    let gateway = MockGateway::new(2);
    let mut config = test_config(1);
    config.gateway.url = None;
    config.gateway.shard_count = None;
    let client = Client::with_transports(config, http.clone(), gateway.clone());

    let manager = client.connect().await?;
    assert_eq!(manager.total(), 2);
    assert!(http.sent()[0].url.ends_with("/gateway/bot"));

    let conn = gateway.accept(1).await?;
    assert_eq!(conn.url, "wss://bot.gateway.test?v=10&encoding=json");

    client.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancel_on_rate_limit_reports_sent_429() -> Result<()> {
    let http = MockHttp::new();
    http.push(RawResponse::new(429).with_header("retry-after", "2").with_body("{}"));
    let mut config = test_config(1);
    config.rest.cancel_on_rate_limit = true;
    let client = Client::with_transports(config, http.clone(), MockGateway::new(1));

    let err = client.rest().channel(Snowflake::new(1)).await.unwrap_err();
    assert!(matches!(err, HttpError::RetriesExhausted { attempts: 1, .. }));
    assert!(err.was_sent());
    assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
    assert_eq!(http.sent_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_shutdown_closes_rest() {
    let http = MockHttp::new();
    let client = client(&http);
    client.shutdown().await;

    let err = client.rest().channel(Snowflake::new(20)).await.unwrap_err();
    assert!(matches!(err, HttpError::Closed));
    assert_eq!(http.sent_count(), 0);
}
