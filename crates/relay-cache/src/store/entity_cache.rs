//! Per-type concurrent entity store
//!
//! Entities live behind `Arc<RwLock<T>>` inside a map guarded by its own
//! `RwLock`. Writers replicate onto the existing instance while holding the
//! map write lock and the entity write lock, so a reader copying out under the
//! entity read lock never sees a half-applied update.

use parking_lot::RwLock;
use relay_common::CacheMode;
use relay_core::Entity;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{CacheError, CacheResult};

/// An entity handed out by the cache
///
/// `Live` shares the stored instance: later updates are visible through it.
/// `Snapshot` is a private deep copy that never changes.
#[derive(Debug, Clone)]
pub enum Cached<T> {
    Live(Arc<RwLock<T>>),
    Snapshot(T),
}

impl<T: Entity> Cached<T> {
    /// Take a deep copy of the current value
    #[must_use]
    pub fn snapshot(&self) -> T {
        match self {
            Self::Live(shared) => shared.read().snapshot(),
            Self::Snapshot(value) => value.snapshot(),
        }
    }

    /// Consume into an owned value
    #[must_use]
    pub fn into_inner(self) -> T {
        match self {
            Self::Live(shared) => shared.read().snapshot(),
            Self::Snapshot(value) => value,
        }
    }

    /// Run `f` against the value without copying it
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        match self {
            Self::Live(shared) => f(&shared.read()),
            Self::Snapshot(value) => f(value),
        }
    }

    /// Check if this handle observes later updates
    #[inline]
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }

    /// Check if two handles share the same stored instance
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Live(a), Self::Live(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Concurrent store for one entity type
pub struct EntityCache<T: Entity> {
    mode: CacheMode,
    entries: RwLock<HashMap<T::Key, Arc<RwLock<T>>>>,
}

impl<T: Entity> EntityCache<T> {
    /// Create an empty store handing out entities per `mode`
    #[must_use]
    pub fn new(mode: CacheMode) -> Self {
        Self {
            mode,
            entries: RwLock::new(HashMap::new()),
        }
    }

    #[inline]
    #[must_use]
    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    fn hand_out(&self, shared: Arc<RwLock<T>>) -> Cached<T> {
        match self.mode {
            CacheMode::Mutable => Cached::Live(shared),
            CacheMode::Immutable => Cached::Snapshot(shared.read().snapshot()),
        }
    }

    /// Insert `candidate` or copy it over the stored entity with the same key
    ///
    /// The candidate must already be decoded (and detached); nothing here can
    /// fail, so a decode error upstream never touches the store.
    pub fn upsert(&self, candidate: T) -> Cached<T> {
        let key = candidate.key();
        let mut entries = self.entries.write();

        if let Some(shared) = entries.get(&key) {
            let mut stored = shared.write();
            stored.replicate(candidate);
            return match self.mode {
                CacheMode::Mutable => Cached::Live(Arc::clone(shared)),
                CacheMode::Immutable => Cached::Snapshot(stored.snapshot()),
            };
        }

        let shared = Arc::new(RwLock::new(candidate));
        entries.insert(key, Arc::clone(&shared));
        drop(entries);
        self.hand_out(shared)
    }

    /// Insert only if no entity with the same key is stored
    pub fn insert_if_absent(&self, candidate: T) -> bool {
        let key = candidate.key();
        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            return false;
        }
        entries.insert(key, Arc::new(RwLock::new(candidate)));
        true
    }

    /// Look up an entity by key
    pub fn get(&self, key: &T::Key) -> CacheResult<Cached<T>> {
        let shared = self
            .entries
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| CacheError::not_found(T::KIND, key))?;
        Ok(self.hand_out(shared))
    }

    /// Check if an entity with `key` is stored
    #[must_use]
    pub fn contains(&self, key: &T::Key) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Look up an entity by key, returning a deep copy regardless of mode
    #[must_use]
    pub fn peek(&self, key: &T::Key) -> Option<T> {
        let shared = self.entries.read().get(key).cloned()?;
        let value = shared.read().snapshot();
        Some(value)
    }

    /// Mutate a stored entity in place; returns false when absent
    pub fn update(&self, key: &T::Key, f: impl FnOnce(&mut T)) -> bool {
        let Some(shared) = self.entries.read().get(key).cloned() else {
            return false;
        };
        f(&mut shared.write());
        true
    }

    /// Remove an entity; deleting an absent key is a no-op
    pub fn delete(&self, key: &T::Key) -> Option<T> {
        let removed = self.entries.write().remove(key)?;
        let value = removed.read().snapshot();
        Some(value)
    }

    /// Remove every entity for which `keep` returns false
    pub fn retain(&self, mut keep: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut removed = Vec::new();
        self.entries.write().retain(|_, shared| {
            let value = shared.read();
            if keep(&value) {
                true
            } else {
                removed.push(value.snapshot());
                false
            }
        });
        removed
    }

    /// Snapshot of the stored keys
    #[must_use]
    pub fn keys(&self) -> Vec<T::Key> {
        self.entries.read().keys().cloned().collect()
    }

    /// Call `f` for every entity stored when iteration began
    ///
    /// The key set is copied under the read lock; each entity is then fetched
    /// individually, so `f` runs without any cache lock held and may call back
    /// into the cache. Entities deleted mid-iteration are skipped.
    pub fn for_each(&self, mut f: impl FnMut(Cached<T>)) {
        for key in self.keys() {
            if let Ok(entity) = self.get(&key) {
                f(entity);
            }
        }
    }

    /// Every stored entity
    #[must_use]
    pub fn list(&self) -> Vec<Cached<T>> {
        let mut out = Vec::new();
        self.for_each(|entity| out.push(entity));
        out
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl<T: Entity> fmt::Debug for EntityCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCache")
            .field("kind", &T::KIND)
            .field("mode", &self.mode)
            .field("len", &self.len())
            .finish()
    }
}
