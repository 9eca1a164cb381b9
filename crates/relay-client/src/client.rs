//! Client facade
//!
//! Wires one cache, one REST client, one event dispatcher and (after
//! [`Client::connect`]) one shard manager together.

use relay_cache::{Cache, CacheUpdater};
use relay_common::ClientConfig;
use relay_gateway::{
    Controls, EventDispatcher, Handler, PresenceUpdatePayload, Registration,
    RequestGuildMembersPayload, ShardInfo, ShardManager, ShardSettings, TransportFactory,
    VoiceStateUpdatePayload, WsTransportFactory,
};
use relay_http::{HttpTransport, RestClient};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{ClientError, ClientResult};

/// Client runtime
pub struct Client {
    config: ClientConfig,
    cache: Arc<Cache>,
    rest: Arc<RestClient>,
    dispatcher: EventDispatcher,
    gateway: Arc<dyn TransportFactory>,
    shards: Mutex<Option<Arc<ShardManager>>>,
}

impl Client {
    /// Create a client using reqwest and WebSocket transports
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let cache = Arc::new(Cache::new(config.cache));
        let rest = RestClient::new(&config.token, config.rest.clone())?.with_cache(Arc::clone(&cache));
        Ok(Self::assemble(config, cache, rest, Arc::new(WsTransportFactory)))
    }

    /// Create a client over custom transports
    #[must_use]
    pub fn with_transports(
        config: ClientConfig,
        http: Arc<dyn HttpTransport>,
        gateway: Arc<dyn TransportFactory>,
    ) -> Self {
        let cache = Arc::new(Cache::new(config.cache));
        let rest = RestClient::with_transport(&config.token, config.rest.clone(), http)
            .with_cache(Arc::clone(&cache));
        Self::assemble(config, cache, rest, gateway)
    }

    fn assemble(
        config: ClientConfig,
        cache: Arc<Cache>,
        rest: RestClient,
        gateway: Arc<dyn TransportFactory>,
    ) -> Self {
        let rest = Arc::new(rest);
        Self {
            dispatcher: EventDispatcher::with_session(Arc::clone(&cache), Arc::clone(&rest)),
            config,
            cache,
            rest,
            gateway,
            shards: Mutex::new(None),
        }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    #[inline]
    #[must_use]
    pub fn rest(&self) -> &Arc<RestClient> {
        &self.rest
    }

    #[inline]
    #[must_use]
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    // === Handlers ===

    /// Register a handler for an event name (or `"*"`)
    pub fn on(&self, key: impl Into<String>, handler: Handler) -> Registration {
        self.dispatcher.register(key, handler)
    }

    pub fn on_with(
        &self,
        key: impl Into<String>,
        handler: Handler,
        controls: Controls,
    ) -> Registration {
        self.dispatcher.register_with(key, handler, controls)
    }

    // === Gateway ===

    /// Start every shard
    ///
    /// Gateway URL and shard count come from the config, or from
    /// `GET /gateway/bot` for whichever is unset. Returns once the shard tasks
    /// are running; use [`wait_ready`](Self::wait_ready) to wait for sessions.
    pub async fn connect(&self) -> ClientResult<Arc<ShardManager>> {
        let mut slot = self.shards.lock().await;
        if slot.is_some() {
            return Err(ClientError::AlreadyConnected);
        }

        let (url, total) = self.resolve_gateway().await?;
        let settings = ShardSettings::from_config(&self.config.token, &self.config.gateway, url, total);
        let manager = Arc::new(ShardManager::new(
            settings,
            self.gateway.as_ref(),
            Some(CacheUpdater::new(Arc::clone(&self.cache))),
            self.dispatcher.clone(),
        ));
        manager.start();
        *slot = Some(Arc::clone(&manager));

        tracing::info!(shards = total, "Client connected");
        Ok(manager)
    }

    async fn resolve_gateway(&self) -> ClientResult<(String, u32)> {
        let gateway = &self.config.gateway;
        if let (Some(url), Some(total)) = (&gateway.url, gateway.shard_count) {
            return Ok((url.clone(), total.max(1)));
        }

        let bot = self.rest.gateway_bot().await?;
        tracing::info!(
            url = %bot.url,
            recommended_shards = bot.shards,
            sessions_remaining = bot.session_start_limit.remaining,
            "Fetched gateway info"
        );
        let url = gateway.url.clone().unwrap_or(bot.url);
        let total = gateway.shard_count.unwrap_or(bot.shards).max(1);
        Ok((url, total))
    }

    /// The shard manager, once connected
    pub async fn shards(&self) -> Option<Arc<ShardManager>> {
        self.shards.lock().await.clone()
    }

    async fn manager(&self) -> ClientResult<Arc<ShardManager>> {
        self.shards().await.ok_or(ClientError::NotConnected)
    }

    /// Wait until every shard has a session
    pub async fn wait_ready(&self) -> ClientResult<()> {
        self.manager().await?.wait_ready().await?;
        Ok(())
    }

    pub async fn update_voice_state(&self, payload: VoiceStateUpdatePayload) -> ClientResult<()> {
        self.manager().await?.update_voice_state(payload).await?;
        Ok(())
    }

    pub async fn request_guild_members(&self, payload: RequestGuildMembersPayload) -> ClientResult<()> {
        self.manager().await?.request_guild_members(payload).await?;
        Ok(())
    }

    pub async fn update_presence(&self, payload: PresenceUpdatePayload) -> ClientResult<()> {
        self.manager().await?.update_presence(payload).await?;
        Ok(())
    }

    /// Status of every shard; empty before `connect`
    pub async fn shard_info(&self) -> Vec<ShardInfo> {
        match self.shards().await {
            Some(manager) => manager.info(),
            None => Vec::new(),
        }
    }

    /// Stop shards, close the REST client and drop all handlers
    ///
    /// In-flight REST requests complete; new ones fail with `Closed`.
    pub async fn shutdown(&self) {
        let manager = self.shards.lock().await.take();
        if let Some(manager) = manager {
            manager.shutdown().await;
        }
        self.rest.close();
        self.dispatcher.clear();
        tracing::info!("Client shut down");
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("app", &self.config.app.name)
            .field("cache", &self.cache)
            .field("rest", &self.rest)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
