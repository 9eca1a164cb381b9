//! Dispatched events and handler context

use parking_lot::RwLock;
use relay_cache::Cache;
use relay_core::{AnyEntity, GatewayEventType, Snowflake};
use relay_http::RestClient;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::{GatewayError, GatewayResult};
use crate::manager::route_guild;
use crate::protocol::GatewayMessage;
use crate::shard::Shard;

/// A gateway dispatch as seen by handlers
#[derive(Debug, Clone)]
pub struct Event {
    /// Shard that received the dispatch
    pub shard_id: u32,
    /// Raw event name (`t`)
    pub name: String,
    /// Dispatch sequence number (`s`)
    pub sequence: Option<u64>,
    /// Raw payload (`d`)
    pub data: Value,
    /// Entity the cache stored or removed for this event
    pub entity: Option<AnyEntity>,
}

impl Event {
    #[must_use]
    pub fn new(
        shard_id: u32,
        name: impl Into<String>,
        sequence: Option<u64>,
        data: Value,
        entity: Option<AnyEntity>,
    ) -> Self {
        Self {
            shard_id,
            name: name.into(),
            sequence,
            data,
            entity,
        }
    }

    /// Known event type, if the name is one the runtime recognizes
    #[must_use]
    pub fn kind(&self) -> Option<GatewayEventType> {
        GatewayEventType::from_str(&self.name)
    }

    /// Decode the payload into a typed struct
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

/// Client handles shared by every handler context
#[derive(Default)]
pub(crate) struct Session {
    pub(crate) cache: Option<Arc<Cache>>,
    pub(crate) rest: Option<Arc<RestClient>>,
    pub(crate) shards: RwLock<Vec<Shard>>,
}

/// What a handler gets besides the event
///
/// Besides the cache, a context reaches the REST client and the shards, so a
/// handler can answer an event with a request or a gateway command.
#[derive(Clone)]
pub struct Context {
    shard_id: u32,
    session: Arc<Session>,
}

impl Context {
    #[must_use]
    pub fn new(shard_id: u32, cache: Option<Arc<Cache>>) -> Self {
        let session = Session {
            cache,
            ..Session::default()
        };
        Self::with_session(shard_id, Arc::new(session))
    }

    pub(crate) fn with_session(shard_id: u32, session: Arc<Session>) -> Self {
        Self { shard_id, session }
    }

    #[inline]
    #[must_use]
    pub fn shard_id(&self) -> u32 {
        self.shard_id
    }

    /// The cache, already updated for the event being handled
    #[inline]
    #[must_use]
    pub fn cache(&self) -> Option<&Arc<Cache>> {
        self.session.cache.as_ref()
    }

    /// The client's REST client
    #[inline]
    #[must_use]
    pub fn rest(&self) -> Option<&Arc<RestClient>> {
        self.session.rest.as_ref()
    }

    /// The shard that received the event
    #[must_use]
    pub fn shard(&self) -> Option<Shard> {
        self.session.shards.read().get(self.shard_id as usize).cloned()
    }

    /// The shard holding `guild_id`
    #[must_use]
    pub fn shard_for_guild(&self, guild_id: Snowflake) -> Option<Shard> {
        let shards = self.session.shards.read();
        let shard_id = route_guild(&shards, guild_id);
        shards.get(shard_id as usize).cloned()
    }

    /// Send a command on the shard that received the event
    pub async fn send(&self, message: GatewayMessage) -> GatewayResult<()> {
        let shard = self.shard().ok_or(GatewayError::UnknownShard(self.shard_id))?;
        shard.send(message).await
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("shard_id", &self.shard_id)
            .field("cache", &self.session.cache.is_some())
            .field("rest", &self.session.rest.is_some())
            .field("shards", &self.session.shards.read().len())
            .finish()
    }
}
