//! Gateway dispatch to cache mutation

mod cache_updater;

pub use cache_updater::CacheUpdater;
