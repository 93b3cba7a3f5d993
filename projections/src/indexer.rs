//! Index maintainer for the shows projection.
//!
//! Derives every index mutation for a show and submits them as one atomic
//! batch. Index failures are logged and swallowed: the primary write that
//! triggered them has already succeeded and must stay successful.
//!
//! Term-set memberships are not reversed when a show is removed. They are
//! cleaned up out of band by [`ShowIndexer::sweep_orphaned_terms`].

use std::collections::HashSet;
use std::sync::Arc;
use theater_core::index::{IndexBatch, IndexError, IndexStore, keys};
use theater_core::show::{ShowId, ShowRecord};
use theater_core::tokenizer::show_terms;

/// Applies and reverses the index projection of shows.
#[derive(Clone)]
pub struct ShowIndexer {
    index: Arc<dyn IndexStore>,
}

impl ShowIndexer {
    /// Create an indexer writing to `index`.
    #[must_use]
    pub fn new(index: Arc<dyn IndexStore>) -> Self {
        Self { index }
    }

    /// Every mutation that projects `record` into the index.
    ///
    /// The snapshot is written last.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be serialized.
    pub fn projection(record: &ShowRecord) -> Result<IndexBatch, serde_json::Error> {
        let id = record.id.to_string();
        let snapshot = serde_json::to_string(&record.view())?;

        let mut batch = IndexBatch::new()
            .set_add(keys::location(&record.location), id.clone())
            .sorted_upsert(keys::PRICE, id.clone(), f64::from(record.price))
            .sorted_upsert(
                keys::AVAILABILITY,
                id.clone(),
                f64::from(record.available_tickets()),
            )
            .set_add(keys::ALL_SHOWS, id.clone());

        for token in show_terms(&record.name, &record.details) {
            batch = batch.set_add(keys::term(&token), id.clone());
        }

        Ok(batch.put(keys::snapshot(&record.id), snapshot))
    }

    /// Project a show into the index.
    pub async fn index_show(&self, record: &ShowRecord) {
        match Self::projection(record) {
            Ok(batch) => {
                self.submit("index", &record.id, batch).await;
            }
            Err(e) => {
                tracing::warn!(show_id = %record.id, error = %e, "Failed to serialize show snapshot");
                record_failure("index");
            }
        }
    }

    /// Re-project a show after an update.
    ///
    /// Memberships that only the previous version had (old location, tokens no
    /// longer in the name or details) are removed in the same batch.
    pub async fn reindex(&self, previous: &ShowRecord, current: &ShowRecord) {
        let mut batch = match Self::projection(current) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(show_id = %current.id, error = %e, "Failed to serialize show snapshot");
                record_failure("reindex");
                return;
            }
        };

        let id = current.id.to_string();
        let old_location = keys::location(&previous.location);
        if old_location != keys::location(&current.location) {
            batch = batch.set_remove(old_location, id.clone());
        }

        let current_terms: HashSet<String> =
            show_terms(&current.name, &current.details).into_iter().collect();
        for token in show_terms(&previous.name, &previous.details) {
            if !current_terms.contains(&token) {
                batch = batch.set_remove(keys::term(&token), id.clone());
            }
        }

        self.submit("reindex", &current.id, batch).await;
    }

    /// Reverse location, price, availability and global memberships and drop
    /// the snapshot.
    pub async fn remove_show(&self, id: &ShowId, location: &str) {
        let member = id.to_string();
        let batch = IndexBatch::new()
            .set_remove(keys::location(location), member.clone())
            .sorted_remove(keys::PRICE, member.clone())
            .sorted_remove(keys::AVAILABILITY, member.clone())
            .set_remove(keys::ALL_SHOWS, member)
            .delete(keys::snapshot(id));

        self.submit("remove", id, batch).await;
    }

    /// Rewrite only the availability score.
    ///
    /// Concurrent calls for the same show are last-writer-wins.
    pub async fn update_availability(&self, id: &ShowId, available_tickets: u32) {
        let batch = IndexBatch::new().sorted_upsert(
            keys::AVAILABILITY,
            id.to_string(),
            f64::from(available_tickets),
        );

        self.submit("availability", id, batch).await;
    }

    /// Re-project a batch of shows, returning how many were applied.
    pub async fn rebuild(&self, records: &[ShowRecord]) -> usize {
        let mut applied = 0;
        for record in records {
            let Ok(batch) = Self::projection(record) else {
                record_failure("rebuild");
                continue;
            };
            if self.submit("rebuild", &record.id, batch).await {
                applied += 1;
            }
        }
        applied
    }

    /// Remove term-set members that are no longer indexed shows.
    ///
    /// Returns the number of memberships removed.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] if the index cannot be scanned or updated.
    pub async fn sweep_orphaned_terms(&self) -> Result<u64, IndexError> {
        let live = self.index.set_members(keys::ALL_SHOWS).await?;
        let term_keys = self.index.scan_prefix(keys::TERM_PREFIX).await?;
        let mut removed = 0u64;

        for key in term_keys {
            let members = self.index.set_members(&key).await?;
            let orphans: Vec<String> = members
                .into_iter()
                .filter(|member| !live.contains(member))
                .collect();
            if orphans.is_empty() {
                continue;
            }
            self.index.set_remove(&key, &orphans).await?;
            removed += orphans.len() as u64;
        }

        tracing::info!(removed, "Swept orphaned term memberships");
        Ok(removed)
    }

    async fn submit(&self, op: &'static str, id: &ShowId, batch: IndexBatch) -> bool {
        let ops = batch.len();
        match self.index.execute(batch).await {
            Ok(()) => {
                tracing::debug!(show_id = %id, op, ops, "Index batch applied");
                true
            }
            Err(e) => {
                tracing::warn!(show_id = %id, op, error = %e, "Index batch failed; index may be stale");
                record_failure(op);
                false
            }
        }
    }
}

fn record_failure(op: &'static str) {
    metrics::counter!("theater_index_write_failures_total", "op" => op).increment(1);
}
