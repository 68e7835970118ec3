//! Secondary-key index over a [`Repository`].
//!
//! The alias cache maps a normalized secondary key to a primary id and never
//! holds entity data itself. Every alias hit is checked against the entity
//! the primary cache resolves to, so a rename can never surface old data
//! through one cache and new data through the other.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::{CacheStats, Lookup, Sweep, TtlCache};
use crate::clock::SharedClock;
use crate::domain::IndexedEntity;
use crate::error::{Result, StateError};
use crate::repository::{store_failure, Repository};
use crate::store::{AltKeyStore, EntityStore, StoreError};

// == Indexed Repository ==
pub struct IndexedRepository<E: IndexedEntity> {
    primary: Repository<E>,
    by_alt: Arc<TtlCache<String, E::Id>>,
    store: Arc<dyn AltKeyStore<E>>,
}

impl<E: IndexedEntity> IndexedRepository<E> {
    /// `store` and `alt_store` are normally the same backend seen through
    /// its two traits.
    pub fn new(
        store: Arc<dyn EntityStore<E>>,
        alt_store: Arc<dyn AltKeyStore<E>>,
        alias_label: &'static str,
        clock: SharedClock,
        ttl: Duration,
        negative_ttl: Duration,
    ) -> Self {
        let primary = Repository::new(store, clock.clone(), ttl, negative_ttl);
        Self {
            primary,
            by_alt: Arc::new(TtlCache::new(alias_label, clock, ttl, negative_ttl)),
            store: alt_store,
        }
    }

    /// Primary-key access.
    pub fn primary(&self) -> &Repository<E> {
        &self.primary
    }

    pub async fn resolve(&self, id: &E::Id) -> Result<Arc<E>> {
        self.primary.resolve(id).await
    }

    // == Resolve By Alternate Key ==
    /// Looks an entity up by its secondary key.
    pub async fn resolve_by_alt(&self, raw: &str) -> Result<Arc<E>> {
        let alt = E::normalize_alt(raw);

        match self.by_alt.get(&alt) {
            Lookup::Found(id) => match self.primary.resolve(&id).await {
                Ok(entity) if entity.alt_key() == alt => return Ok(entity),
                Ok(_) | Err(StateError::NotFound(_)) => {
                    debug!(kind = %E::KIND, alt = %alt, "dropping stale alias");
                    self.by_alt.delete_if(&alt, |cached| *cached == id);
                }
                Err(err) => return Err(err),
            },
            Lookup::NegativeCached => return Err(StateError::NotFound(E::KIND)),
            Lookup::Absent => {}
        }

        match self.store.fetch_by_alt(&alt).await {
            Ok(entity) => {
                let entity = self.primary.admit(entity);
                if entity.alt_key() == alt {
                    self.by_alt.add(alt, entity.id());
                }
                Ok(entity)
            }
            Err(StoreError::NotFound) => {
                self.by_alt.add_negative_if_absent(alt);
                Err(StateError::NotFound(E::KIND))
            }
            Err(err) => Err(store_failure::<E>("fetch_by_alt", &alt, err)),
        }
    }

    // == Create ==
    pub async fn create(&self, draft: E::Draft) -> Result<Arc<E>> {
        let created = self.primary.create(draft).await?;
        self.by_alt.add(created.alt_key(), created.id());
        Ok(created)
    }

    // == Update ==
    /// Writes through both caches: the old alias is dropped and the new one
    /// points at the edited entity.
    pub async fn update(&self, id: &E::Id, patch: &E::Patch) -> Result<Arc<E>> {
        let previous_alt = self.primary.cached(id).map(|entity| entity.alt_key());
        let fresh = self.primary.update(id, patch).await?;

        let fresh_alt = fresh.alt_key();
        if let Some(previous) = previous_alt.filter(|previous| *previous != fresh_alt) {
            self.by_alt.delete_if(&previous, |cached| cached == id);
        }
        self.by_alt.add(fresh_alt, fresh.id());
        Ok(fresh)
    }

    // == Invalidate ==
    pub fn invalidate(&self, id: &E::Id) -> bool {
        if let Some(entity) = self.primary.cached(id) {
            self.by_alt.delete(&entity.alt_key());
        }
        self.primary.invalidate(id)
    }

    pub fn stats(&self) -> CacheStats {
        self.primary.stats()
    }

    pub fn alias_stats(&self) -> CacheStats {
        self.by_alt.stats()
    }

    pub fn alias_label(&self) -> &'static str {
        self.by_alt.name()
    }

    /// Both caches, for the background sweep.
    pub fn sweepers(&self) -> Vec<Arc<dyn Sweep>> {
        let aliases: Arc<dyn Sweep> = self.by_alt.clone();
        vec![self.primary.sweeper(), aliases]
    }
}

impl<E: IndexedEntity> std::fmt::Debug for IndexedRepository<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedRepository")
            .field("primary", &self.primary)
            .field("aliases", &self.by_alt.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::{Course, CourseDraft, CoursePatch};
    use crate::error::EntityKind;
    use crate::store::MemoryStore;

    fn courses() -> (IndexedRepository<Course>, Arc<MemoryStore<Course>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(MemoryStore::<Course>::new(clock.clone()));
        let repo = IndexedRepository::new(
            store.clone(),
            store.clone(),
            "course_name",
            clock.clone(),
            Duration::from_secs(600),
            Duration::from_secs(60),
        );
        (repo, store, clock)
    }

    fn draft(name: &str) -> CourseDraft {
        CourseDraft {
            course_name: name.to_string(),
            course_description: "intro".to_string(),
            topic_id: None,
            added_by: "owner".to_string(),
        }
    }

    fn rename(name: &str) -> CoursePatch {
        CoursePatch {
            course_name: name.to_string(),
            course_description: "intro".to_string(),
            topic_id: None,
        }
    }

    #[tokio::test]
    async fn test_lookup_by_name_is_case_insensitive_and_cached() {
        let (repo, store, _) = courses();
        let created = repo.create(draft("Algebra")).await.unwrap();

        let found = repo.resolve_by_alt("  ALGEBRA ").await.unwrap();

        assert_eq!(found.course_id, created.course_id);
        assert_eq!(store.reads(), 0);
    }

    #[tokio::test]
    async fn test_cold_lookup_populates_both_caches() {
        let (repo, store, _) = courses();
        let created = repo.create(draft("Algebra")).await.unwrap();
        repo.invalidate(&created.course_id);

        repo.resolve_by_alt("algebra").await.unwrap();
        repo.resolve_by_alt("algebra").await.unwrap();
        repo.resolve(&created.course_id).await.unwrap();

        assert_eq!(store.reads(), 1);
    }

    #[tokio::test]
    async fn test_rename_moves_alias() {
        let (repo, _, _) = courses();
        let created = repo.create(draft("Algebra")).await.unwrap();

        repo.update(&created.course_id, &rename("Linear Algebra"))
            .await
            .unwrap();

        assert!(matches!(
            repo.resolve_by_alt("algebra").await,
            Err(StateError::NotFound(EntityKind::Course))
        ));
        let renamed = repo.resolve_by_alt("linear algebra").await.unwrap();
        assert_eq!(renamed.course_name, "Linear Algebra");
        assert_eq!(
            repo.resolve(&created.course_id).await.unwrap().course_name,
            "Linear Algebra"
        );
    }

    #[tokio::test]
    async fn test_rename_overrides_negative_alias() {
        let (repo, _, _) = courses();
        let created = repo.create(draft("Algebra")).await.unwrap();
        assert!(repo.resolve_by_alt("geometry").await.is_err());

        repo.update(&created.course_id, &rename("Geometry"))
            .await
            .unwrap();

        assert_eq!(
            repo.resolve_by_alt("geometry").await.unwrap().course_id,
            created.course_id
        );
    }

    #[tokio::test]
    async fn test_stale_alias_is_never_served() {
        let (repo, store, _) = courses();
        let created = repo.create(draft("Algebra")).await.unwrap();
        // rename applied straight to the store, then the primary entry dropped
        store
            .update(&created.course_id, &rename("Calculus"))
            .await
            .unwrap();
        repo.primary().invalidate(&created.course_id);

        assert!(repo.resolve_by_alt("algebra").await.is_err());
        assert_eq!(
            repo.resolve_by_alt("calculus").await.unwrap().course_id,
            created.course_id
        );
    }

    #[tokio::test]
    async fn test_unknown_name_negative_cached() {
        let (repo, store, clock) = courses();

        assert!(repo.resolve_by_alt("chemistry").await.is_err());
        assert!(repo.resolve_by_alt("Chemistry").await.is_err());
        assert_eq!(store.reads(), 1);

        clock.advance(Duration::from_secs(61));
        assert!(repo.resolve_by_alt("chemistry").await.is_err());
        assert_eq!(store.reads(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_name_already_exists() {
        let (repo, _, _) = courses();
        repo.create(draft("Algebra")).await.unwrap();

        assert!(matches!(
            repo.create(draft("algebra")).await,
            Err(StateError::AlreadyExists(EntityKind::Course))
        ));
    }
}
