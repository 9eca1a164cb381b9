//! Event broadcasting to user handlers

mod dispatcher;
mod event;
mod handler;

pub use dispatcher::{EventDispatcher, Registration, WILDCARD};
pub use event::{Context, Event};
pub use handler::{Controls, Handler};
