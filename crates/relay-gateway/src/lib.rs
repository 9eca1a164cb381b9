//! # relay-gateway
//!
//! Gateway connections for the relay client runtime.
//!
//! ## Features
//!
//! - **Shards**: one task per shard with Hello, Identify/Resume, jittered
//!   heartbeats, zombie detection and backoff reconnects
//! - **Resume continuity**: replayed dispatches are dropped by sequence, so
//!   handlers never see a sequence number twice
//! - **Shard manager**: guild routing for voice and member commands,
//!   presence updates, per-shard command limits
//! - **Event dispatcher**: named and wildcard handlers with invocation and
//!   TTL limits, each draining its own ordered queue
//!
//! ## Example
//!
//! ```ignore
//! use relay_gateway::{EventDispatcher, Handler, ShardManager, ShardSettings, WsTransportFactory};
//!
//! let dispatcher = EventDispatcher::with_cache(cache.clone());
//! dispatcher.register("MESSAGE_CREATE", Handler::event(|ctx, event| {
//!     tracing::info!(shard_id = ctx.shard_id(), seq = ?event.sequence, "message");
//! }));
//!
//! let settings = ShardSettings::from_config(token, &config.gateway, url, 2);
//! let manager = ShardManager::new(settings, &WsTransportFactory, Some(updater), dispatcher);
//! manager.start();
//! manager.wait_ready().await?;
//! ```

pub mod broadcast;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod shard;
pub mod transport;

pub use broadcast::{Context, Controls, Event, EventDispatcher, Handler, Registration, WILDCARD};
pub use error::{GatewayError, GatewayResult, TransportError};
pub use manager::{shard_id_for, ShardManager};
pub use protocol::{
    CloseCode, GatewayMessage, HelloPayload, IdentifyPayload, IdentifyProperties, Intents, OpCode,
    PresenceUpdatePayload, RequestGuildMembersPayload, ResumePayload, VoiceStateUpdatePayload,
};
pub use shard::{gateway_url, Backoff, Shard, ShardInfo, ShardSettings, ShardState, API_VERSION};
pub use transport::{Transport, TransportFactory, WsTransport, WsTransportFactory};
