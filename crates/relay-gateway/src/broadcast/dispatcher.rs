//! Event dispatcher
//!
//! Routes each dispatch to the handlers registered for its name and to the
//! `*` wildcard handlers. Every registration owns a queue and a worker task:
//! events reach a handler in the order they were dispatched, a slow handler
//! only delays itself, and invocation limits are counted exactly.

use parking_lot::RwLock;
use relay_cache::Cache;
use relay_http::RestClient;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::event::{Context, Event, Session};
use super::handler::{Controls, Delivery, Handler};
use crate::shard::Shard;

/// Registration key matching every event
pub const WILDCARD: &str = "*";

struct Slot {
    id: u64,
    queue: mpsc::UnboundedSender<Arc<Event>>,
}

struct Registry {
    next_id: AtomicU64,
    slots: RwLock<HashMap<String, Vec<Slot>>>,
    session: Arc<Session>,
}

impl Registry {
    fn remove(&self, key: &str, id: u64) -> bool {
        let mut slots = self.slots.write();
        let Some(list) = slots.get_mut(key) else {
            return false;
        };
        let before = list.len();
        list.retain(|slot| slot.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            slots.remove(key);
        }
        removed
    }
}

/// Dispatches gateway events to registered handlers
#[derive(Clone)]
pub struct EventDispatcher {
    registry: Arc<Registry>,
}

impl EventDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::build(Session::default())
    }

    /// Dispatcher whose handlers get the cache through their [`Context`]
    #[must_use]
    pub fn with_cache(cache: Arc<Cache>) -> Self {
        Self::build(Session {
            cache: Some(cache),
            ..Session::default()
        })
    }

    /// Dispatcher whose handlers get the cache and the REST client
    ///
    /// Shards are attached by the shard manager that dispatches through it.
    #[must_use]
    pub fn with_session(cache: Arc<Cache>, rest: Arc<RestClient>) -> Self {
        Self::build(Session {
            cache: Some(cache),
            rest: Some(rest),
            shards: RwLock::default(),
        })
    }

    fn build(session: Session) -> Self {
        Self {
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(1),
                slots: RwLock::new(HashMap::new()),
                session: Arc::new(session),
            }),
        }
    }

    /// Make `shards` reachable from handler contexts
    pub(crate) fn attach_shards(&self, shards: &[Shard]) {
        *self.registry.session.shards.write() = shards.to_vec();
    }

    /// Register a handler with no limits
    pub fn register(&self, key: impl Into<String>, handler: Handler) -> Registration {
        self.register_with(key, handler, Controls::default())
    }

    /// Register a handler for an event name, or [`WILDCARD`] for all events
    ///
    /// Must be called inside a Tokio runtime; the handler runs on its own task.
    pub fn register_with(
        &self,
        key: impl Into<String>,
        handler: Handler,
        controls: Controls,
    ) -> Registration {
        let key = key.into();
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let (queue, rx) = mpsc::unbounded_channel();

        self.registry
            .slots
            .write()
            .entry(key.clone())
            .or_default()
            .push(Slot { id, queue });

        tracing::debug!(key = %key, id, handler = handler.name(), ?controls, "Handler registered");

        tokio::spawn(worker(
            Arc::downgrade(&self.registry),
            key.clone(),
            id,
            handler,
            controls,
            rx,
            Arc::clone(&self.registry.session),
        ));

        Registration {
            id,
            key,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Hand an event to every matching registration
    ///
    /// Never blocks; returns how many registrations it was queued for.
    pub fn dispatch(&self, event: Event) -> usize {
        let event = Arc::new(event);
        let mut delivered = 0;
        let mut closed = Vec::new();

        {
            let slots = self.registry.slots.read();
            for key in [event.name.as_str(), WILDCARD] {
                let Some(list) = slots.get(key) else {
                    continue;
                };
                for slot in list {
                    if slot.queue.send(Arc::clone(&event)).is_ok() {
                        delivered += 1;
                    } else {
                        closed.push((key.to_string(), slot.id));
                    }
                }
            }
        }

        // Workers that ended without deregistering (a handler panicked)
        for (key, id) in closed {
            self.registry.remove(&key, id);
        }

        tracing::trace!(event = %event.name, seq = ?event.sequence, delivered, "Event dispatched");
        delivered
    }

    /// Active registrations for a key
    #[must_use]
    pub fn handler_count(&self, key: &str) -> usize {
        self.registry.slots.read().get(key).map_or(0, Vec::len)
    }

    /// Active registrations across all keys
    #[must_use]
    pub fn total_handlers(&self) -> usize {
        self.registry.slots.read().values().map(Vec::len).sum()
    }

    /// Remove every registration; their workers stop after draining
    pub fn clear(&self) {
        self.registry.slots.write().clear();
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("handlers", &self.total_handlers())
            .field("cache", &self.registry.session.cache.is_some())
            .field("rest", &self.registry.session.rest.is_some())
            .finish()
    }
}

/// Handle to a registered handler
///
/// Dropping it leaves the handler registered; call [`Registration::cancel`]
/// to remove it.
#[derive(Clone)]
pub struct Registration {
    id: u64,
    key: String,
    registry: Weak<Registry>,
}

impl Registration {
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Remove the handler; returns false if it was already gone
    pub fn cancel(&self) -> bool {
        let removed = self
            .registry
            .upgrade()
            .is_some_and(|registry| registry.remove(&self.key, self.id));
        if removed {
            tracing::debug!(key = %self.key, id = self.id, "Handler cancelled");
        }
        removed
    }

    /// Check if the handler still receives events
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.registry.upgrade().is_some_and(|registry| {
            registry
                .slots
                .read()
                .get(&self.key)
                .is_some_and(|list| list.iter().any(|slot| slot.id == self.id))
        })
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("key", &self.key)
            .finish()
    }
}

async fn worker(
    registry: Weak<Registry>,
    key: String,
    id: u64,
    mut handler: Handler,
    controls: Controls,
    mut rx: mpsc::UnboundedReceiver<Arc<Event>>,
    session: Arc<Session>,
) {
    let deadline = controls.ttl.map(|ttl| Instant::now() + ttl);
    let mut invocations = 0u32;

    loop {
        let next = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(next) => next,
                Err(_) => {
                    tracing::debug!(key = %key, id, "Handler expired");
                    break;
                }
            },
            None => rx.recv().await,
        };
        // Cancelled: the queue sender was dropped
        let Some(event) = next else {
            break;
        };
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }

        let ctx = Context::with_session(event.shard_id, Arc::clone(&session));
        match handler.invoke(&ctx, &event).await {
            Delivery::Delivered => invocations += 1,
            Delivery::Skipped => {}
            Delivery::Closed => break,
        }
        if controls.exhausted(invocations) {
            tracing::debug!(key = %key, id, invocations, "Handler reached its invocation limit");
            break;
        }
    }

    if let Some(registry) = registry.upgrade() {
        registry.remove(&key, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn event(name: &str, seq: u64) -> Event {
        Event::new(0, name, Some(seq), json!({ "seq": seq }), None)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_routes_by_name_and_wildcard() {
        let dispatcher = EventDispatcher::new();
        let (named, mut named_rx) = Handler::channel();
        let (all, mut all_rx) = Handler::channel();
        dispatcher.register("CHANNEL_CREATE", named);
        dispatcher.register(WILDCARD, all);

        assert_eq!(dispatcher.dispatch(event("CHANNEL_CREATE", 1)), 2);
        assert_eq!(dispatcher.dispatch(event("TYPING_START", 2)), 1);

        assert_eq!(named_rx.recv().await.unwrap().sequence, Some(1));
        assert_eq!(all_rx.recv().await.unwrap().name, "CHANNEL_CREATE");
        assert_eq!(all_rx.recv().await.unwrap().name, "TYPING_START");
        assert!(named_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_order_is_preserved_per_handler() {
        let dispatcher = EventDispatcher::new();
        let (handler, mut rx) = Handler::channel();
        dispatcher.register("MESSAGE_CREATE", handler);

        for seq in 1..=50 {
            dispatcher.dispatch(event("MESSAGE_CREATE", seq));
        }
        for seq in 1..=50 {
            assert_eq!(rx.recv().await.unwrap().sequence, Some(seq));
        }
    }

    #[tokio::test]
    async fn test_max_invocations_is_exact() {
        let dispatcher = EventDispatcher::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let registration = dispatcher.register_with(
            "GUILD_CREATE",
            Handler::unit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            Controls::new().max_invocations(3),
        );

        for seq in 1..=10 {
            dispatcher.dispatch(event("GUILD_CREATE", seq));
        }
        settle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!registration.is_active());
        assert_eq!(dispatcher.handler_count("GUILD_CREATE"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expires_registration() {
        let dispatcher = EventDispatcher::new();
        let (handler, mut rx) = Handler::channel();
        let registration = dispatcher.register_with(
            "READY",
            handler,
            Controls::new().ttl(Duration::from_secs(5)),
        );

        dispatcher.dispatch(event("READY", 1));
        assert!(rx.recv().await.is_some());

        tokio::time::sleep(Duration::from_secs(6)).await;
        settle().await;
        assert!(!registration.is_active());
        assert_eq!(dispatcher.dispatch(event("READY", 2)), 0);
        // Worker dropped the channel sender
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel() {
        let dispatcher = EventDispatcher::new();
        let (handler, mut rx) = Handler::channel();
        let registration = dispatcher.register("MESSAGE_CREATE", handler);

        assert!(registration.cancel());
        assert!(!registration.cancel());
        assert_eq!(dispatcher.dispatch(event("MESSAGE_CREATE", 1)), 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_typed_handler_skips_undecodable_payloads() {
        #[derive(Deserialize)]
        struct Payload {
            seq: u64,
        }

        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&seen);
        let registration = dispatcher.register_with(
            "X",
            Handler::typed(move |_ctx, payload: Payload| {
                sink.store(payload.seq, Ordering::SeqCst);
            }),
            Controls::once(),
        );

        dispatcher.dispatch(Event::new(0, "X", Some(1), json!({ "other": true }), None));
        settle().await;
        // Skipped deliveries do not count towards the limit
        assert!(registration.is_active());

        dispatcher.dispatch(event("X", 7));
        settle().await;
        assert_eq!(seen.load(Ordering::SeqCst), 7);
        assert!(!registration.is_active());
    }

    #[tokio::test]
    async fn test_context_carries_cache_and_shard() {
        let cache = Arc::new(Cache::new(relay_common::CacheConfig::default()));
        let dispatcher = EventDispatcher::with_cache(Arc::clone(&cache));
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatcher.register(
            WILDCARD,
            Handler::context(move |ctx| {
                let _ = tx.send((ctx.shard_id(), ctx.cache().is_some()));
            }),
        );

        dispatcher.dispatch(Event::new(3, "ANY", None, json!(null), None));
        assert_eq!(rx.recv().await, Some((3, true)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_handler_keeps_order_without_blocking_others() {
        let dispatcher = EventDispatcher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatcher.register(
            "E",
            Handler::future(move |_ctx, event: Event| {
                let tx = tx.clone();
                async move {
                    // Earlier events sleep longer; delivery order must still hold
                    let delay = 10 - event.sequence.unwrap_or(0);
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                    let _ = tx.send(event.sequence);
                }
            }),
        );
        let (fast, mut fast_rx) = Handler::channel();
        dispatcher.register("E", fast);

        for seq in 1..=3 {
            dispatcher.dispatch(event("E", seq));
        }
        for seq in 1..=3 {
            assert_eq!(fast_rx.recv().await.unwrap().sequence, Some(seq));
        }
        for seq in 1..=3 {
            assert_eq!(rx.recv().await.unwrap(), Some(seq));
        }
    }

    #[tokio::test]
    async fn test_typed_future_handler_decodes_payload() {
        #[derive(Deserialize)]
        struct Payload {
            seq: u64,
        }

        let dispatcher = EventDispatcher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registration = dispatcher.register_with(
            "X",
            Handler::typed_future(move |ctx: Context, payload: Payload| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send((ctx.shard_id(), payload.seq));
                }
            }),
            Controls::once(),
        );

        dispatcher.dispatch(Event::new(2, "X", Some(1), json!({ "other": true }), None));
        dispatcher.dispatch(Event::new(2, "X", Some(4), json!({ "seq": 4 }), None));
        assert_eq!(rx.recv().await, Some((2, 4)));
        settle().await;
        assert!(!registration.is_active());
    }

    #[tokio::test]
    async fn test_context_without_shards_rejects_commands() {
        let dispatcher = EventDispatcher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatcher.register(
            WILDCARD,
            Handler::future(move |ctx, _event| {
                let tx = tx.clone();
                async move {
                    let sent = ctx.send(crate::protocol::GatewayMessage::heartbeat(None)).await;
                    let _ = tx.send((ctx.rest().is_some(), ctx.shard().is_some(), sent.is_err()));
                }
            }),
        );

        dispatcher.dispatch(Event::new(0, "ANY", None, json!(null), None));
        assert_eq!(rx.recv().await, Some((false, false, true)));
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_affect_others() {
        let dispatcher = EventDispatcher::new();
        dispatcher.register("E", Handler::unit(|| panic!("handler bug")));
        let (handler, mut rx) = Handler::channel();
        dispatcher.register("E", handler);

        dispatcher.dispatch(event("E", 1));
        assert!(rx.recv().await.is_some());
        settle().await;

        // The dead registration is pruned on the next dispatch
        assert_eq!(dispatcher.dispatch(event("E", 2)), 1);
        assert_eq!(dispatcher.handler_count("E"), 1);
        assert!(rx.recv().await.is_some());
    }
}
