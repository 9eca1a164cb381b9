//! # relay-cache
//!
//! Concurrent in-memory object cache for gateway entities.
//!
//! ## Features
//!
//! - **Entity stores**: one concurrent store per entity type, handing out live
//!   references (mutable mode) or private snapshots (immutable mode)
//! - **Detaching**: embedded children are cached under their own keys and
//!   resolved through ID indexes
//! - **Voice states**: per-guild session sets with join/move/leave semantics
//! - **Cache updater**: applies gateway dispatch events to the cache
//!
//! ## Example
//!
//! ```ignore
//! use relay_cache::{Cache, CacheUpdater};
//!
//! let cache = Arc::new(Cache::new(config.cache));
//! let updater = CacheUpdater::new(cache.clone());
//!
//! updater.apply("CHANNEL_CREATE", &data);
//! let channel = cache.channel(channel_id)?.into_inner();
//! ```

pub mod cache;
pub mod error;
pub mod store;
pub mod updater;

pub use cache::{Cache, CacheStats, Stored};
pub use error::{CacheError, CacheResult};
pub use store::{Cached, EntityCache, VoiceStateSet, VoiceStateStore, VoiceUpdate};
pub use updater::CacheUpdater;
