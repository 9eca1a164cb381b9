//! End-to-end gateway tests
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use anyhow::Result;
use integration_tests::*;
use relay_client::Client;
use relay_core::{AnyEntity, ErrorKind, Snowflake};
use relay_gateway::{
    gateway_url, Event, GatewayMessage, Handler, ShardState, VoiceStateUpdatePayload, WILDCARD,
};
use relay_http::Request;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

fn client(gateway: &Arc<MockGateway>, shards: u32) -> Client {
    Client::with_transports(test_config(shards), MockHttp::new(), gateway.clone())
}

/// Collect events until one with `name` arrives
async fn until(rx: &mut mpsc::UnboundedReceiver<Event>, name: &str) -> Result<Vec<Event>> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(rx).await?;
        let done = event.name == name;
        seen.push(event);
        if done {
            return Ok(seen);
        }
    }
}

// ============================================================================
// Identify and dispatch
// ============================================================================

#[tokio::test]
async fn test_channel_create_updates_cache_before_handlers() -> Result<()> {
    let gateway = MockGateway::new(1);
    let client = client(&gateway, 1);

    let (handler, mut events) = Handler::channel();
    client.on("CHANNEL_CREATE", handler);

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    client.on(
        "CHANNEL_CREATE",
        Handler::event(move |ctx, _event| {
            let cached = ctx
                .cache()
                .is_some_and(|cache| cache.channel(Snowflake::new(20)).is_ok());
            let _ = seen_tx.send(cached);
        }),
    );

    client.connect().await?;
    let mut conn = gateway.accept(0).await?;
    assert_eq!(conn.url, "wss://gateway.test?v=10&encoding=json");

    let identify = conn.handshake(1, ready([0, 1], &[10])).await?;
    assert_eq!(identify["d"]["token"], "test-token");
    assert_eq!(identify["d"]["shard"], json!([0, 1]));
    client.wait_ready().await?;

    conn.dispatch("CHANNEL_CREATE", 2, text_channel(20, 10, "general"));

    let event = next_event(&mut events).await?;
    assert_eq!(event.shard_id, 0);
    assert_eq!(event.sequence, Some(2));
    match &event.entity {
        Some(AnyEntity::Channel(channel)) => {
            assert_eq!(channel.name.as_deref(), Some("general"));
        }
        other => panic!("expected a channel entity, got {other:?}"),
    }
    // The handler already saw the channel in the cache
    assert!(next_event(&mut seen_rx).await?);

    let stored = client.cache().channel(Snowflake::new(20))?.into_inner();
    assert_eq!(stored.guild_id, Some(Snowflake::new(10)));
    assert_eq!(
        client.cache().current_user().map(|u| u.id),
        Some(Snowflake::new(BOT_ID))
    );

    client.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_guild_create_populates_cache() -> Result<()> {
    let gateway = MockGateway::new(1);
    let client = client(&gateway, 1);
    let (handler, mut events) = Handler::channel();
    client.on("GUILD_CREATE", handler);

    client.connect().await?;
    let mut conn = gateway.accept(0).await?;
    conn.handshake(1, ready([0, 1], &[10])).await?;
    client.wait_ready().await?;
    assert_eq!(client.cache().stats().guilds, 1);

    conn.dispatch(
        "GUILD_CREATE",
        2,
        guild(10, "relay", 7, vec![text_channel(20, 10, "general"), voice_channel(30, 10, "vc")]),
    );
    next_event(&mut events).await?;

    let cached = client.cache().guild(Snowflake::new(10))?.into_inner();
    assert_eq!(cached.name, "relay");
    assert!(!cached.unavailable);
    assert_eq!(client.cache().guild_channels(Snowflake::new(10))?.len(), 2);
    assert_eq!(
        client.cache().member_user(Snowflake::new(10), Snowflake::new(7))?.into_inner().username,
        "owner"
    );

    client.shutdown().await;
    Ok(())
}

// ============================================================================
// Resume
// ============================================================================

#[tokio::test]
async fn test_resume_delivers_every_event_once() -> Result<()> {
    let gateway = MockGateway::new(1);
    let client = client(&gateway, 1);
    let (handler, mut events) = Handler::channel();
    client.on(WILDCARD, handler);

    client.connect().await?;
    let mut first = gateway.accept(0).await?;
    first.handshake(1, ready([0, 1], &[])).await?;
    first.dispatch("MESSAGE_CREATE", 2, json!({ "id": "1", "content": "a" }));
    let mut seen = until(&mut events, "MESSAGE_CREATE").await?;

    first.drop_connection();

    let mut second = gateway.accept(0).await?;
    assert_eq!(second.url, gateway_url(RESUME_URL));
    second.hello(45_000);
    let resume = second.recv_op(6).await?;
    assert_eq!(resume["d"]["session_id"], SESSION_ID);
    assert_eq!(resume["d"]["seq"], 2);
    assert_eq!(resume["d"]["token"], "test-token");

    // Replay of 2 is dropped, 3 is new
    second.dispatch("MESSAGE_CREATE", 2, json!({ "id": "1", "content": "a" }));
    second.dispatch("MESSAGE_CREATE", 3, json!({ "id": "2", "content": "b" }));
    second.send(json!({ "op": 0, "t": "RESUMED", "s": null, "d": {} }));
    seen.extend(until(&mut events, "RESUMED").await?);
    client.wait_ready().await?;

    let sequences: Vec<Option<u64>> = seen.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![Some(1), Some(2), Some(3), None]);
    assert_eq!(client.shard_info().await[0].sequence, 3);

    client.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_reconnect_request_resumes() -> Result<()> {
    let gateway = MockGateway::new(1);
    let client = client(&gateway, 1);

    client.connect().await?;
    let mut first = gateway.accept(0).await?;
    first.handshake(1, ready([0, 1], &[])).await?;
    client.wait_ready().await?;

    first.send(json!({ "op": 7, "d": null }));

    let mut second = gateway.accept(0).await?;
    assert_eq!(first.client_close_code(), Some(4000));
    second.hello(45_000);
    let resume = second.recv_op(6).await?;
    assert_eq!(resume["d"]["seq"], 1);

    client.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_invalid_session_starts_fresh() -> Result<()> {
    let gateway = MockGateway::new(1);
    let client = client(&gateway, 1);

    client.connect().await?;
    let mut first = gateway.accept(0).await?;
    first.handshake(1, ready([0, 1], &[])).await?;
    client.wait_ready().await?;

    first.send(json!({ "op": 9, "d": false }));

    let mut second = gateway.accept(0).await?;
    second.hello(45_000);
    // Not resumable, so a new Identify rather than Resume
    let identify = second.recv_op(2).await?;
    assert_eq!(identify["d"]["token"], "test-token");
    let info = &client.shard_info().await[0];
    assert_eq!(info.sequence, 0);
    assert_eq!(info.session_id, None);

    second.dispatch("READY", 1, ready([0, 1], &[]));
    client.wait_ready().await?;

    client.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_missing_heartbeat_acks_trigger_resume() -> Result<()> {
    let gateway = MockGateway::without_heartbeat_acks(1);
    let client = client(&gateway, 1);

    client.connect().await?;
    let mut first = gateway.accept(0).await?;
    first.hello(1_000);
    first.recv_op(2).await?;
    first.dispatch("READY", 1, ready([0, 1], &[]));
    client.wait_ready().await?;

    first.recv_op(1).await?;

    let mut second = gateway.accept(0).await?;
    assert_eq!(first.client_close_code(), Some(4000));
    second.hello(1_000);
    let resume = second.recv_op(6).await?;
    assert_eq!(resume["d"]["session_id"], SESSION_ID);

    client.shutdown().await;
    Ok(())
}

// ============================================================================
// Failure
// ============================================================================

#[tokio::test]
async fn test_authentication_failure_is_fatal() -> Result<()> {
    let gateway = MockGateway::new(1);
    let client = client(&gateway, 1);

    client.connect().await?;
    let mut conn = gateway.accept(0).await?;
    conn.hello(45_000);
    conn.recv_op(2).await?;
    conn.close(4004);

    let err = client.wait_ready().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Auth);
    assert!(err.is_auth());
    assert_eq!(client.shard_info().await[0].state, ShardState::Disconnected);

    client.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_connect_twice_is_rejected() -> Result<()> {
    let gateway = MockGateway::new(1);
    let client = client(&gateway, 1);

    client.connect().await?;
    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, relay_client::ClientError::AlreadyConnected));

    client.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_commands_before_connect_fail() {
    let gateway = MockGateway::new(1);
    let client = client(&gateway, 1);

    let err = client
        .update_voice_state(VoiceStateUpdatePayload::leave(Snowflake::new(10)))
        .await
        .unwrap_err();
    assert!(matches!(err, relay_client::ClientError::NotConnected));
}

// ============================================================================
// Voice
// ============================================================================

#[tokio::test]
async fn test_voice_sessions_are_unique_per_session_id() -> Result<()> {
    let gateway = MockGateway::new(1);
    let client = client(&gateway, 1);
    let (handler, mut events) = Handler::channel();
    client.on("VOICE_STATE_UPDATE", handler);

    client.connect().await?;
    let mut conn = gateway.accept(0).await?;
    conn.handshake(1, ready([0, 1], &[10])).await?;
    conn.dispatch("GUILD_CREATE", 2, guild(10, "relay", 7, vec![voice_channel(30, 10, "vc")]));

    conn.dispatch("VOICE_STATE_UPDATE", 3, voice_state(10, 5, "s1", Some(30)));
    conn.dispatch("VOICE_STATE_UPDATE", 4, voice_state(10, 5, "s2", Some(30)));
    conn.dispatch("VOICE_STATE_UPDATE", 5, voice_state(10, 5, "s1", None));

    next_event(&mut events).await?;
    next_event(&mut events).await?;
    let leave = next_event(&mut events).await?;
    match &leave.entity {
        Some(AnyEntity::VoiceState(state)) => assert_eq!(state.session_id, "s1"),
        other => panic!("expected the removed voice state, got {other:?}"),
    }

    let guild_id = Snowflake::new(10);
    let remaining = client.cache().user_voice_states(guild_id, Snowflake::new(5));
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].snapshot().session_id, "s2");
    assert_eq!(
        client.cache().voice_channel_users(guild_id, Snowflake::new(30)),
        vec![Snowflake::new(5)]
    );

    client.shutdown().await;
    Ok(())
}

// ============================================================================
// Handlers acting on the client
// ============================================================================

#[tokio::test]
async fn test_async_handler_uses_rest_and_shard() -> Result<()> {
    let gateway = MockGateway::new(1);
    let http = MockHttp::new();
    http.push_json(200, &json!({ "id": "2", "channel_id": "20", "content": "pong" }));
    let client = Client::with_transports(test_config(1), http.clone(), gateway.clone());

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    client.on(
        "MESSAGE_CREATE",
        Handler::future(move |ctx, event| {
            let done_tx = done_tx.clone();
            async move {
                let channel_id = event.data["channel_id"].as_str().unwrap_or_default().to_string();
                let replied = match ctx.rest() {
                    Some(rest) => rest
                        .execute(
                            Request::post(format!("/channels/{channel_id}/messages"))
                                .body(json!({ "content": "pong" })),
                        )
                        .await
                        .is_ok(),
                    None => false,
                };
                let join = VoiceStateUpdatePayload::join(Snowflake::new(10), Snowflake::new(30));
                let joined = match GatewayMessage::voice_state_update(&join) {
                    Ok(frame) => ctx.send(frame).await.is_ok(),
                    Err(_) => false,
                };
                let _ = done_tx.send((replied, joined));
            }
        }),
    );

    client.connect().await?;
    let mut conn = gateway.accept(0).await?;
    conn.handshake(1, ready([0, 1], &[10])).await?;
    client.wait_ready().await?;

    conn.dispatch("MESSAGE_CREATE", 2, json!({ "id": "1", "channel_id": "20", "content": "ping" }));
    assert_eq!(next_event(&mut done_rx).await?, (true, true));

    let sent = http.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].url.ends_with("/channels/20/messages"));
    let frame = conn.recv_op(4).await?;
    assert_eq!(frame["d"]["guild_id"], "10");

    client.shutdown().await;
    Ok(())
}

// ============================================================================
// Sharding
// ============================================================================

#[tokio::test]
async fn test_guild_commands_route_to_owning_shard() -> Result<()> {
    let gateway = MockGateway::new(2);
    let client = client(&gateway, 2);

    client.connect().await?;
    let mut shard0 = gateway.accept(0).await?;
    let mut shard1 = gateway.accept(1).await?;
    // Guild 10 maps to shard 0 by id but READY placed it on shard 1
    shard0.handshake(1, ready([0, 2], &[])).await?;
    shard1.handshake(1, ready([1, 2], &[10])).await?;
    client.wait_ready().await?;

    client
        .update_voice_state(VoiceStateUpdatePayload::join(Snowflake::new(10), Snowflake::new(30)))
        .await?;
    let frame = shard1.recv_op(4).await?;
    assert_eq!(frame["d"]["guild_id"], "10");
    assert_eq!(frame["d"]["channel_id"], "30");

    // Untracked guilds fall back to the id formula
    client
        .update_voice_state(VoiceStateUpdatePayload::leave(Snowflake::new(20)))
        .await?;
    let frame = shard0.recv_op(4).await?;
    assert_eq!(frame["d"]["guild_id"], "20");
    assert!(frame["d"]["channel_id"].is_null());

    client.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_shutdown_closes_every_shard() -> Result<()> {
    let gateway = MockGateway::new(2);
    let client = client(&gateway, 2);

    let manager = client.connect().await?;
    let mut shard0 = gateway.accept(0).await?;
    let mut shard1 = gateway.accept(1).await?;
    shard0.handshake(1, ready([0, 2], &[])).await?;
    shard1.handshake(1, ready([1, 2], &[])).await?;
    client.wait_ready().await?;

    client.shutdown().await;

    assert_eq!(shard0.client_close_code(), Some(1000));
    assert_eq!(shard1.client_close_code(), Some(1000));
    assert!(manager.is_shut_down());
    assert!(manager.info().iter().all(|s| s.state == ShardState::Disconnected));
    assert!(client.shard_info().await.is_empty());
    assert!(client.rest().is_closed());
    assert_eq!(client.dispatcher().total_handlers(), 0);
    Ok(())
}
