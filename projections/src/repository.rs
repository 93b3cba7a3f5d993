//! Cache-aside repository.
//!
//! Wraps a primary record store with a JSON record cache kept in the index
//! store under `cache:{kind}:{id}`:
//!
//! - **read-through**: cache hit is returned as-is; a miss (or unreadable
//!   cache entry, or unreachable cache) loads the primary record and writes it
//!   back.
//! - **write-through**: the primary store is always written first; the cache
//!   refresh that follows is best-effort.
//!
//! The cache is never the only writer of record state.

use std::marker::PhantomData;
use std::sync::Arc;
use theater_core::TheaterError;
use theater_core::index::IndexStore;
use theater_core::store::{Entity, RecordStore};

/// Where a read was served from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Record cache hit
    Hit,
    /// Loaded from the primary store and written back
    Miss,
}

/// A record together with how it was obtained.
#[derive(Clone, Debug)]
pub struct Lookup<E> {
    /// The record
    pub entity: E,
    /// Cache hit or miss
    pub outcome: CacheOutcome,
}

/// Read-through / write-through access to one entity type.
///
/// `S` may be unsized, so `CachedRepository<ShowRecord, dyn ShowStore>` works
/// with the `Arc<dyn ShowStore>` handed out by the composition root.
pub struct CachedRepository<E: Entity, S: ?Sized + RecordStore<E>> {
    primary: Arc<S>,
    cache: Arc<dyn IndexStore>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity, S: ?Sized + RecordStore<E>> Clone for CachedRepository<E, S> {
    fn clone(&self) -> Self {
        Self {
            primary: Arc::clone(&self.primary),
            cache: Arc::clone(&self.cache),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity, S: ?Sized + RecordStore<E>> CachedRepository<E, S> {
    /// Create a repository over `primary`, caching in `cache`.
    #[must_use]
    pub fn new(primary: Arc<S>, cache: Arc<dyn IndexStore>) -> Self {
        Self {
            primary,
            cache,
            _entity: PhantomData,
        }
    }

    /// The wrapped primary store.
    #[must_use]
    pub const fn primary(&self) -> &Arc<S> {
        &self.primary
    }

    /// Read-through get.
    ///
    /// # Errors
    ///
    /// [`TheaterError::NotFound`] when the primary store has no such record,
    /// [`TheaterError::Store`] when the primary store fails.
    pub async fn get(&self, id: &E::Id) -> Result<E, TheaterError> {
        Ok(self.lookup(id).await?.entity)
    }

    /// Read-through get that also reports whether the cache answered.
    ///
    /// # Errors
    ///
    /// Same as [`Self::get`].
    pub async fn lookup(&self, id: &E::Id) -> Result<Lookup<E>, TheaterError> {
        let key = E::cache_key(id);

        match self.cache.get(&key).await {
            Ok(Some(json)) => match serde_json::from_str::<E>(&json) {
                Ok(entity) => {
                    metrics::counter!("theater_cache_total", "kind" => E::KIND, "result" => "hit")
                        .increment(1);
                    return Ok(Lookup {
                        entity,
                        outcome: CacheOutcome::Hit,
                    });
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Discarding unreadable cache entry");
                }
            },
            Ok(None) => {
                tracing::debug!(key = %key, "Cache miss");
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache unavailable, reading primary store");
            }
        }

        metrics::counter!("theater_cache_total", "kind" => E::KIND, "result" => "miss").increment(1);
        let entity = self.load_fresh(id).await?;
        Ok(Lookup {
            entity,
            outcome: CacheOutcome::Miss,
        })
    }

    /// Load from the primary store, bypassing the cache, and refresh the cache.
    ///
    /// # Errors
    ///
    /// Same as [`Self::get`].
    pub async fn load_fresh(&self, id: &E::Id) -> Result<E, TheaterError> {
        let entity = self
            .primary
            .fetch(id)
            .await?
            .ok_or_else(|| TheaterError::NotFound {
                entity: E::KIND,
                id: id.to_string(),
            })?;
        self.refresh(&entity).await;
        Ok(entity)
    }

    /// Insert into the primary store, then cache.
    ///
    /// # Errors
    ///
    /// Primary store errors only; cache failures are logged.
    pub async fn create(&self, entity: &E) -> Result<(), TheaterError> {
        self.primary.insert(entity).await?;
        self.refresh(entity).await;
        Ok(())
    }

    /// Delete from the primary store, then from the cache.
    ///
    /// # Errors
    ///
    /// Primary store errors only; cache failures are logged.
    pub async fn delete(&self, id: &E::Id) -> Result<(), TheaterError> {
        self.primary.remove(id).await?;
        self.invalidate(id).await;
        Ok(())
    }

    /// Best-effort cache write of an entity the caller already persisted.
    pub async fn refresh(&self, entity: &E) {
        let key = E::cache_key(entity.id());
        let json = match serde_json::to_string(entity) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to serialize cache entry");
                return;
            }
        };
        if let Err(e) = self.cache.put(&key, &json).await {
            tracing::warn!(key = %key, error = %e, "Failed to refresh cache entry");
        }
    }

    /// Best-effort cache delete.
    pub async fn invalidate(&self, id: &E::Id) {
        let key = E::cache_key(id);
        if let Err(e) = self.cache.delete(&key).await {
            tracing::warn!(key = %key, error = %e, "Failed to invalidate cache entry");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use theater_core::index::IndexStore as _;
    use theater_core::show::ShowRecord;
    use theater_core::store::ShowStore;
    use theater_testing::{FlakyIndexStore, InMemoryIndexStore, InMemoryShowStore, fixtures};

    fn repo(
        index: &InMemoryIndexStore,
        shows: &InMemoryShowStore,
    ) -> CachedRepository<ShowRecord, dyn ShowStore> {
        let primary: Arc<dyn ShowStore> = Arc::new(shows.clone());
        CachedRepository::new(primary, Arc::new(index.clone()))
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let index = InMemoryIndexStore::new();
        let shows = InMemoryShowStore::new();
        let show = fixtures::show("Cats", "Downtown", 100, 50);
        shows.insert(&show).await.unwrap();
        let repo = repo(&index, &shows);

        let first = repo.lookup(&show.id).await.unwrap();
        assert_eq!(first.outcome, CacheOutcome::Miss);
        assert!(index.contains_key(&ShowRecord::cache_key(&show.id)));

        let second = repo.lookup(&show.id).await.unwrap();
        assert_eq!(second.outcome, CacheOutcome::Hit);
        assert_eq!(second.entity, show);
    }

    #[tokio::test]
    async fn corrupt_entry_is_refreshed() {
        let index = InMemoryIndexStore::new();
        let shows = InMemoryShowStore::new();
        let show = fixtures::show("Cats", "Downtown", 100, 50);
        shows.insert(&show).await.unwrap();
        let key = ShowRecord::cache_key(&show.id);
        index.put(&key, "{not json").await.unwrap();

        let lookup = repo(&index, &shows).lookup(&show.id).await.unwrap();

        assert_eq!(lookup.outcome, CacheOutcome::Miss);
        assert_eq!(lookup.entity, show);
        let cached: ShowRecord = serde_json::from_str(&index.raw(&key).unwrap()).unwrap();
        assert_eq!(cached, show);
    }

    #[tokio::test]
    async fn missing_everywhere_is_not_found() {
        let repo = repo(&InMemoryIndexStore::new(), &InMemoryShowStore::new());
        let err = repo.get(&theater_core::show::ShowId::new()).await.unwrap_err();
        assert!(matches!(err, TheaterError::NotFound { entity: "show", .. }));
    }

    #[tokio::test]
    async fn writes_succeed_when_cache_is_down() {
        let flaky = FlakyIndexStore::new(InMemoryIndexStore::new());
        flaky.set_failing(true);
        let shows = InMemoryShowStore::new();
        let primary: Arc<dyn ShowStore> = Arc::new(shows.clone());
        let repo = CachedRepository::new(primary, Arc::new(flaky.clone()));
        let show = fixtures::show("Cats", "Downtown", 100, 50);

        repo.create(&show).await.unwrap();
        assert_eq!(repo.get(&show.id).await.unwrap(), show);

        repo.delete(&show.id).await.unwrap();
        assert!(shows.is_empty());
        assert!(flaky.rejected_calls() >= 3);
    }

    #[tokio::test]
    async fn delete_clears_primary_and_cache() {
        let index = InMemoryIndexStore::new();
        let shows = InMemoryShowStore::new();
        let repo = repo(&index, &shows);
        let show = fixtures::show("Cats", "Downtown", 100, 50);
        repo.create(&show).await.unwrap();

        repo.delete(&show.id).await.unwrap();

        assert!(!index.contains_key(&ShowRecord::cache_key(&show.id)));
        assert!(matches!(
            repo.get(&show.id).await,
            Err(TheaterError::NotFound { .. })
        ));
    }
}
