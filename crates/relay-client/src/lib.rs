//! # relay-client
//!
//! Client runtime for a Discord-style chat API: gateway shards, a
//! rate-limited REST client and a concurrent entity cache behind one facade.
//!
//! ## Features
//!
//! - **Client**: connects every shard, resolving URL and shard count from
//!   `GET /gateway/bot` when the config leaves them unset
//! - **Cache first**: dispatches update the cache before handlers run
//! - **Shutdown**: stops shards, closes REST and drops handlers in one call
//!
//! ## Example
//!
//! ```ignore
//! use relay_client::Client;
//! use relay_common::ClientConfig;
//! use relay_gateway::Handler;
//!
//! let client = Client::new(ClientConfig::from_env()?)?;
//! client.on("MESSAGE_CREATE", Handler::event(|_ctx, event| {
//!     tracing::info!(seq = ?event.sequence, "message");
//! }));
//! client.connect().await?;
//! client.wait_ready().await?;
//! ```

pub mod client;
pub mod error;

pub use client::Client;
pub use error::{ClientError, ClientResult};
