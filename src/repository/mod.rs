//! Repository Module
//!
//! Cache-aside access to the persistent store. Reads check the entity cache
//! first and fall back to the store on a miss; writes go to the store first
//! and are written through to the cache only once the store accepted them.
//! No store call is ever made while a cache lock is held.

mod indexed;

pub use indexed::IndexedRepository;

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::{CacheStats, Lookup, Sweep, TtlCache};
use crate::clock::SharedClock;
use crate::domain::Entity;
use crate::error::{Result, StateError};
use crate::store::{EntityStore, StoreError};

// == Repository ==
/// Cache-aside wrapper around one entity type's store.
pub struct Repository<E: Entity> {
    cache: Arc<TtlCache<E::Id, Arc<E>>>,
    store: Arc<dyn EntityStore<E>>,
}

impl<E: Entity> Repository<E> {
    // == Constructor ==
    pub fn new(
        store: Arc<dyn EntityStore<E>>,
        clock: SharedClock,
        ttl: Duration,
        negative_ttl: Duration,
    ) -> Self {
        Self {
            cache: Arc::new(TtlCache::new(E::KIND.as_str(), clock, ttl, negative_ttl)),
            store,
        }
    }

    // == Resolve ==
    /// Returns the entity under `id`, consulting the store only on a miss.
    ///
    /// A store "not found" is remembered for one negative TTL. Any other
    /// store failure is reported as `Internal` and left uncached.
    pub async fn resolve(&self, id: &E::Id) -> Result<Arc<E>> {
        match self.cache.get(id) {
            Lookup::Found(entity) => {
                debug!(kind = %E::KIND, %id, "cache hit");
                return Ok(entity);
            }
            Lookup::NegativeCached => {
                debug!(kind = %E::KIND, %id, "negative cache hit");
                return Err(StateError::NotFound(E::KIND));
            }
            Lookup::Absent => debug!(kind = %E::KIND, %id, "cache miss"),
        }

        match self.store.fetch(id).await {
            Ok(entity) => Ok(self.admit(entity)),
            Err(StoreError::NotFound) => {
                self.cache.add_negative_if_absent(id.clone());
                Err(StateError::NotFound(E::KIND))
            }
            Err(err) => Err(store_failure::<E>("fetch", id, err)),
        }
    }

    // == Create ==
    /// Inserts through the store and caches the stored row, replacing any
    /// negative marker left for its key.
    pub async fn create(&self, draft: E::Draft) -> Result<Arc<E>> {
        let created = self.store.insert(draft).await.map_err(|err| match err {
            StoreError::AlreadyExists => StateError::AlreadyExists(E::KIND),
            other => store_failure::<E>("insert", &"<new>", other),
        })?;
        let id = created.id();
        debug!(kind = %E::KIND, %id, "created");
        Ok(self.cache.replace_with(id, |_| Arc::new(created)))
    }

    // == Update ==
    /// Applies `patch` in the store, then writes the stored row through to
    /// the cache. The cache is untouched when the store rejects the edit.
    pub async fn update(&self, id: &E::Id, patch: &E::Patch) -> Result<Arc<E>> {
        let fresh = match self.store.update(id, patch).await {
            Ok(fresh) => fresh,
            Err(StoreError::NotFound) => {
                self.cache.delete(id);
                return Err(StateError::NotFound(E::KIND));
            }
            Err(StoreError::AlreadyExists) => return Err(StateError::AlreadyExists(E::KIND)),
            Err(err) => return Err(store_failure::<E>("update", id, err)),
        };
        debug!(kind = %E::KIND, %id, "updated");
        Ok(self.write_through(fresh))
    }

    // == Invalidate ==
    /// Drops `id` from the cache; the next resolve goes to the store.
    pub fn invalidate(&self, id: &E::Id) -> bool {
        self.cache.delete(id)
    }

    /// Cached copy of `id`, without falling back to the store.
    pub fn cached(&self, id: &E::Id) -> Option<Arc<E>> {
        self.cache.get(id).found()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn label(&self) -> &'static str {
        self.cache.name()
    }

    /// Handle for the background sweep.
    pub fn sweeper(&self) -> Arc<dyn Sweep> {
        self.cache.clone()
    }

    /// Caches a row read from the store unless a live copy is already
    /// cached, in which case the cached copy wins.
    pub(crate) fn admit(&self, entity: E) -> Arc<E> {
        self.cache.get_or_add_with(entity.id(), || Arc::new(entity))
    }

    /// Replaces the cached copy with `fresh`, carrying in-memory state over
    /// from the copy it replaces.
    pub(crate) fn write_through(&self, mut fresh: E) -> Arc<E> {
        self.cache.replace_with(fresh.id(), |cached| {
            if let Some(cached) = cached {
                cached.carry_over(&mut fresh);
            }
            Arc::new(fresh)
        })
    }
}

impl<E: Entity> std::fmt::Debug for Repository<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("kind", &E::KIND)
            .field("cached", &self.cache.len())
            .finish()
    }
}

pub(crate) fn store_failure<E: Entity>(
    op: &str,
    id: &dyn std::fmt::Display,
    err: StoreError,
) -> StateError {
    match err {
        StoreError::NotFound => StateError::NotFound(E::KIND),
        StoreError::AlreadyExists => StateError::AlreadyExists(E::KIND),
        StoreError::Backend(detail) => {
            StateError::Internal(format!("{op} {} {id}: {detail}", E::KIND))
        }
    }
}
