//! Event handlers and their delivery controls

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;

use super::event::{Context, Event};

type AsyncFn = Box<dyn FnMut(Context, Event) -> BoxFuture<'static, ()> + Send>;
type AsyncTypedFn =
    Box<dyn FnMut(Context, Event) -> Result<BoxFuture<'static, ()>, serde_json::Error> + Send>;

/// A callback registered for an event name
///
/// Synchronous variants run inline on the registration's worker task and
/// should return quickly. Work that waits on I/O, such as a REST call or a
/// gateway command through the [`Context`], belongs in an async variant; its
/// future is awaited before the next event reaches the same handler.
pub enum Handler {
    /// Called with nothing
    Unit(Box<dyn FnMut() + Send>),
    /// Called with the context only
    Context(Box<dyn FnMut(&Context) + Send>),
    /// Called with the context and the raw event
    Event(Box<dyn FnMut(&Context, &Event) + Send>),
    /// Decodes the payload first; payloads that fail to decode are skipped
    Typed(Box<dyn FnMut(&Context, &Event) -> Result<(), serde_json::Error> + Send>),
    /// Awaited with an owned context and event
    Async(AsyncFn),
    /// Decodes the payload first, then awaits; undecodable payloads are skipped
    AsyncTyped(AsyncTypedFn),
    /// Forwards each event into a channel
    Channel(mpsc::UnboundedSender<Event>),
}

/// Result of handing one event to a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    /// Not counted as an invocation
    Skipped,
    /// The handler can no longer receive
    Closed,
}

impl Handler {
    pub fn unit(f: impl FnMut() + Send + 'static) -> Self {
        Self::Unit(Box::new(f))
    }

    pub fn context(f: impl FnMut(&Context) + Send + 'static) -> Self {
        Self::Context(Box::new(f))
    }

    pub fn event(f: impl FnMut(&Context, &Event) + Send + 'static) -> Self {
        Self::Event(Box::new(f))
    }

    /// Handler receiving the payload decoded as `T`
    pub fn typed<T, F>(mut f: F) -> Self
    where
        T: DeserializeOwned,
        F: FnMut(&Context, T) + Send + 'static,
    {
        Self::Typed(Box::new(move |ctx: &Context, event: &Event| {
            let payload = event.decode::<T>()?;
            f(ctx, payload);
            Ok(())
        }))
    }

    /// Async handler receiving the context and the raw event
    pub fn future<F, Fut>(mut f: F) -> Self
    where
        F: FnMut(Context, Event) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::Async(Box::new(
            move |ctx: Context, event: Event| -> BoxFuture<'static, ()> { Box::pin(f(ctx, event)) },
        ))
    }

    /// Async handler receiving the payload decoded as `T`
    pub fn typed_future<T, F, Fut>(mut f: F) -> Self
    where
        T: DeserializeOwned,
        F: FnMut(Context, T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::AsyncTyped(Box::new(
            move |ctx: Context, event: Event| -> Result<BoxFuture<'static, ()>, serde_json::Error> {
                let payload = event.decode::<T>()?;
                Ok(Box::pin(f(ctx, payload)))
            },
        ))
    }

    /// Handler forwarding events to a channel, and the receiving end
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::Channel(tx), rx)
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Unit(_) => "unit",
            Self::Context(_) => "context",
            Self::Event(_) => "event",
            Self::Typed(_) => "typed",
            Self::Async(_) => "async",
            Self::AsyncTyped(_) => "async_typed",
            Self::Channel(_) => "channel",
        }
    }

    pub(crate) async fn invoke(&mut self, ctx: &Context, event: &Event) -> Delivery {
        match self {
            Self::Unit(f) => f(),
            Self::Context(f) => f(ctx),
            Self::Event(f) => f(ctx, event),
            Self::Typed(f) => {
                if let Err(e) = f(ctx, event) {
                    tracing::debug!(event = %event.name, error = %e, "Typed handler skipped undecodable payload");
                    return Delivery::Skipped;
                }
            }
            Self::Async(f) => f(ctx.clone(), event.clone()).await,
            Self::AsyncTyped(f) => match f(ctx.clone(), event.clone()) {
                Ok(fut) => fut.await,
                Err(e) => {
                    tracing::debug!(event = %event.name, error = %e, "Typed handler skipped undecodable payload");
                    return Delivery::Skipped;
                }
            },
            Self::Channel(tx) => {
                if tx.send(event.clone()).is_err() {
                    return Delivery::Closed;
                }
            }
        }
        Delivery::Delivered
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler::{}", self.name())
    }
}

/// Limits on how long a registration stays active
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Controls {
    /// Remove the registration after this many deliveries
    pub max_invocations: Option<u32>,
    /// Remove the registration this long after it was made
    pub ttl: Option<Duration>,
}

impl Controls {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a single event
    #[must_use]
    pub fn once() -> Self {
        Self::new().max_invocations(1)
    }

    #[must_use]
    pub fn max_invocations(mut self, max: u32) -> Self {
        self.max_invocations = Some(max);
        self
    }

    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub(crate) fn exhausted(&self, invocations: u32) -> bool {
        self.max_invocations.is_some_and(|max| invocations >= max)
    }
}
