//! Show catalogue operations.
//!
//! Every write goes to the primary record store first. The record cache and
//! the index follow best-effort, so an unreachable index never fails a write.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use theater_core::TheaterError;
use theater_core::environment::Clock;
use theater_core::error::Result;
use theater_core::search::{SearchCriteria, SearchResult, SearchStatistics};
use theater_core::show::{NewShow, ShowId, ShowPatch, ShowRecord, ShowView};
use theater_core::store::{RecordStore, ShowStore};
use theater_projections::{CachedRepository, SearchExecutor, ShowIndexer};

/// Outcome of a full index rebuild.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReindexReport {
    /// Shows read from the primary store
    pub shows_seen: u64,
    /// Shows whose index batch applied
    pub shows_indexed: u64,
    /// Stale term memberships removed, `None` if the sweep failed
    pub orphaned_terms_removed: Option<u64>,
}

/// Show catalogue service.
#[derive(Clone)]
pub struct ShowService {
    repository: CachedRepository<ShowRecord, dyn ShowStore>,
    indexer: ShowIndexer,
    search: SearchExecutor,
    clock: Arc<dyn Clock>,
    page_size: u32,
}

impl ShowService {
    /// Create the service.
    ///
    /// `page_size` is the batch size used when paging through the primary
    /// store during [`Self::reindex_all`].
    #[must_use]
    pub fn new(
        repository: CachedRepository<ShowRecord, dyn ShowStore>,
        indexer: ShowIndexer,
        search: SearchExecutor,
        clock: Arc<dyn Clock>,
        page_size: u32,
    ) -> Self {
        Self {
            repository,
            indexer,
            search,
            clock,
            page_size: page_size.max(1),
        }
    }

    fn store(&self) -> &Arc<dyn ShowStore> {
        self.repository.primary()
    }

    /// Create a show with nothing booked.
    ///
    /// # Errors
    ///
    /// [`TheaterError::Validation`] for a blank name or location,
    /// [`TheaterError::Store`] if the primary store rejects the write.
    pub async fn create_show(&self, request: NewShow) -> Result<ShowRecord> {
        let record = request.into_record(ShowId::new(), self.clock.now())?;
        self.repository.create(&record).await?;
        self.indexer.index_show(&record).await;

        tracing::info!(show_id = %record.id, location = %record.location, "Show created");
        Ok(record)
    }

    /// Fetch a show, read-through the record cache.
    ///
    /// # Errors
    ///
    /// [`TheaterError::NotFound`] for an unknown id.
    pub async fn get_show(&self, id: &ShowId) -> Result<ShowRecord> {
        self.repository.get(id).await
    }

    /// Apply a partial update and re-project the show.
    ///
    /// The current version is read from the primary store, not the cache. The
    /// booked count is only written when the patch sets it, and the store
    /// re-checks it against the new total at write time, so reservations made
    /// meanwhile are kept. Cache and index are refreshed from the stored row.
    ///
    /// # Errors
    ///
    /// [`TheaterError::Validation`] when the result would be invalid (blank
    /// fields, booked above total), [`TheaterError::Conflict`] when
    /// concurrent bookings pushed the booked count above the new total,
    /// [`TheaterError::NotFound`] for an unknown id.
    pub async fn update_show(&self, id: &ShowId, patch: ShowPatch) -> Result<ShowRecord> {
        let previous = self.repository.load_fresh(id).await?;
        let booked = patch.booked_tickets;
        let next = patch.apply(&previous, self.clock.now())?;
        let stored = self.store().update_attributes(&next, booked).await?;
        self.repository.refresh(&stored).await;
        self.indexer.reindex(&previous, &stored).await;

        tracing::info!(show_id = %id, booked = stored.booked_tickets, "Show updated");
        Ok(stored)
    }

    /// Overwrite the booked ticket count.
    ///
    /// # Errors
    ///
    /// [`TheaterError::CapacityExceeded`] when `booked` exceeds the total,
    /// [`TheaterError::NotFound`] for an unknown id.
    pub async fn update_ticket_availability(&self, id: &ShowId, booked: u32) -> Result<ShowRecord> {
        let record = self
            .store()
            .set_booked_tickets(id, booked, self.clock.now())
            .await?;
        self.repository.refresh(&record).await;
        self.indexer
            .update_availability(id, record.available_tickets())
            .await;

        tracing::debug!(show_id = %id, booked, available = record.available_tickets(), "Availability updated");
        Ok(record)
    }

    /// Delete a show and its bookings.
    ///
    /// # Errors
    ///
    /// [`TheaterError::NotFound`] for an unknown id.
    pub async fn delete_show(&self, id: &ShowId) -> Result<()> {
        let record = self
            .store()
            .fetch(id)
            .await?
            .ok_or_else(|| TheaterError::NotFound {
                entity: "show",
                id: id.to_string(),
            })?;

        self.repository.delete(id).await?;
        self.indexer.remove_show(id, &record.location).await;

        tracing::info!(show_id = %id, "Show deleted");
        Ok(())
    }

    /// Paginated search.
    ///
    /// # Errors
    ///
    /// [`TheaterError::Validation`] for an inverted price range.
    pub async fn search_shows(&self, criteria: SearchCriteria) -> Result<SearchResult> {
        self.search.search(criteria).await
    }

    /// Shows at a location.
    ///
    /// # Errors
    ///
    /// [`TheaterError::Validation`] for a blank location.
    pub async fn get_shows_by_location(
        &self,
        location: &str,
        only_available: bool,
    ) -> Result<Vec<ShowView>> {
        self.search.by_location(location, only_available).await
    }

    /// Shows priced within `[min, max]`, cheapest first.
    ///
    /// # Errors
    ///
    /// [`TheaterError::Validation`] when `min > max`.
    pub async fn get_shows_by_price_range(
        &self,
        min: u32,
        max: u32,
        location: Option<&str>,
    ) -> Result<Vec<ShowView>> {
        self.search.by_price_range(min, max, location).await
    }

    /// Index coverage, or primary store counts when the index is down.
    ///
    /// # Errors
    ///
    /// [`TheaterError::Store`] when both stores fail.
    pub async fn get_search_statistics(&self) -> Result<SearchStatistics> {
        self.search.statistics().await
    }

    /// Re-project every show from the primary store, then sweep stale term
    /// memberships.
    ///
    /// # Errors
    ///
    /// [`TheaterError::Store`] if paging through the primary store fails.
    /// Index failures only lower the counts in the report.
    pub async fn reindex_all(&self) -> Result<ReindexReport> {
        let mut report = ReindexReport::default();
        let mut page = 1;

        loop {
            let criteria = SearchCriteria {
                page,
                page_size: self.page_size,
                ..SearchCriteria::default()
            };
            let (records, total) = self.store().search(&criteria).await?;
            if records.is_empty() {
                break;
            }

            report.shows_seen += records.len() as u64;
            report.shows_indexed += self.indexer.rebuild(&records).await as u64;

            if report.shows_seen >= total {
                break;
            }
            page += 1;
        }

        report.orphaned_terms_removed = match self.indexer.sweep_orphaned_terms().await {
            Ok(removed) => Some(removed),
            Err(e) => {
                tracing::warn!(error = %e, "Orphaned term sweep failed");
                None
            }
        };

        tracing::info!(
            seen = report.shows_seen,
            indexed = report.shows_indexed,
            orphans = ?report.orphaned_terms_removed,
            "Reindex complete"
        );
        Ok(report)
    }
}
