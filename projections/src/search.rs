//! Search executor.
//!
//! Answers multi-criterion show queries from the index store when it can
//! (fast path) and from the primary record store when it cannot (fallback).
//!
//! # Fast path
//!
//! 1. Resolve every criterion to a candidate id set: location set, price
//!    range, availability range, term-set intersection.
//! 2. Intersect the candidate sets, smallest first, stopping at the first
//!    empty one.
//! 3. Hydrate the survivors from their `show:{id}` snapshots in one round trip.
//!    Missing snapshots are dropped; unreadable ones abort the fast path. The
//!    availability score overrides the snapshot's ticket count, since
//!    `update_availability` only rewrites the score.
//! 4. Filter terms, order by name, paginate.
//!
//! # Fallback
//!
//! Any [`IndexError`] on the fast path re-issues the query against the primary
//! record store. Every record loaded that way is queued for re-projection so
//! the index heals after a flush. The two paths agree on membership but not
//! on order: the fallback orders by creation time, newest first.

use crate::indexer::ShowIndexer;
use crate::refresh::RefreshQueue;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use theater_core::TheaterError;
use theater_core::index::{IndexError, IndexResult, IndexStore, ScoreRange, keys};
use theater_core::search::{
    PageLimits, SearchCriteria, SearchResult, SearchStatistics, StatisticsSource,
};
use theater_core::show::{ShowRecord, ShowView};
use theater_core::store::ShowStore;
use theater_core::tokenizer::show_terms;

/// How queries without any index-backed filter are answered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnfilteredStrategy {
    /// Page through the primary record store
    #[default]
    PrimaryStore,
    /// Hydrate every member of `shows:all`
    GlobalSet,
}

impl std::str::FromStr for UnfilteredStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "primary" | "primary_store" => Ok(Self::PrimaryStore),
            "index" | "global" | "global_set" => Ok(Self::GlobalSet),
            other => Err(format!("unknown unfiltered strategy: {other}")),
        }
    }
}

/// Search executor configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct SearchConfig {
    /// Page size defaults and cap
    pub limits: PageLimits,
    /// Handling of unfiltered queries
    pub unfiltered: UnfilteredStrategy,
}

/// Which path produced a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchPath {
    /// Index store
    Index,
    /// Primary record store
    Fallback,
}

impl SearchPath {
    const fn label(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Fallback => "fallback",
        }
    }
}

/// Plans and runs show queries over the index, falling back to the primary store.
#[derive(Clone)]
pub struct SearchExecutor {
    index: Arc<dyn IndexStore>,
    shows: Arc<dyn ShowStore>,
    indexer: ShowIndexer,
    refresh: RefreshQueue,
    config: SearchConfig,
}

impl SearchExecutor {
    /// Create an executor.
    ///
    /// `refresh` receives the re-projection jobs for records loaded on the
    /// fallback path.
    #[must_use]
    pub fn new(
        index: Arc<dyn IndexStore>,
        shows: Arc<dyn ShowStore>,
        refresh: RefreshQueue,
        config: SearchConfig,
    ) -> Self {
        let indexer = ShowIndexer::new(Arc::clone(&index));
        Self {
            index,
            shows,
            indexer,
            refresh,
            config,
        }
    }

    /// Run a paginated search.
    ///
    /// # Errors
    ///
    /// [`TheaterError::Validation`] for contradictory criteria (checked before
    /// any store access), [`TheaterError::Store`] when the fallback path fails.
    /// Index failures are never returned.
    pub async fn search(&self, criteria: SearchCriteria) -> Result<SearchResult, TheaterError> {
        Ok(self.search_with_path(criteria).await?.0)
    }

    /// Like [`Self::search`], also reporting which path answered.
    ///
    /// # Errors
    ///
    /// Same as [`Self::search`].
    pub async fn search_with_path(
        &self,
        criteria: SearchCriteria,
    ) -> Result<(SearchResult, SearchPath), TheaterError> {
        criteria.validate()?;
        let criteria = criteria.normalized(self.config.limits);

        if !criteria.is_index_eligible() && self.config.unfiltered == UnfilteredStrategy::PrimaryStore {
            let result = self.search_primary(&criteria).await?;
            return Ok((result, self.record(SearchPath::Fallback)));
        }

        match self.search_index(&criteria).await {
            Ok(result) => Ok((result, self.record(SearchPath::Index))),
            Err(e) => {
                tracing::warn!(error = %e, "Index search failed, falling back to primary store");
                let result = self.search_primary(&criteria).await?;
                Ok((result, self.record(SearchPath::Fallback)))
            }
        }
    }

    /// Shows at a location, optionally only those with seats left.
    ///
    /// Falls back to the primary store when the index fails or has no entry
    /// for the location (it may have been flushed).
    ///
    /// # Errors
    ///
    /// [`TheaterError::Validation`] for a blank location,
    /// [`TheaterError::Store`] when the fallback path fails.
    pub async fn by_location(
        &self,
        location: &str,
        only_available: bool,
    ) -> Result<Vec<ShowView>, TheaterError> {
        let location = keys::normalize_location(location);
        if location.is_empty() {
            return Err(TheaterError::Validation("location is required".to_string()));
        }

        match self.location_from_index(&location, only_available).await {
            Ok(Some(views)) => {
                self.record(SearchPath::Index);
                return Ok(views);
            }
            Ok(None) => tracing::debug!(location = %location, "Location not indexed, using primary store"),
            Err(e) => tracing::warn!(location = %location, error = %e, "Index lookup failed, using primary store"),
        }

        let records = self.shows.by_location(&location, only_available).await?;
        self.record(SearchPath::Fallback);
        Ok(self.views_with_refresh(records))
    }

    /// Shows priced within `[min, max]`, optionally at a location, cheapest first.
    ///
    /// Falls back to the primary store when the index fails or returns no ids.
    ///
    /// # Errors
    ///
    /// [`TheaterError::Validation`] when `min > max`,
    /// [`TheaterError::Store`] when the fallback path fails.
    pub async fn by_price_range(
        &self,
        min: u32,
        max: u32,
        location: Option<&str>,
    ) -> Result<Vec<ShowView>, TheaterError> {
        if min > max {
            return Err(TheaterError::Validation(format!(
                "min_price ({min}) cannot be greater than max_price ({max})"
            )));
        }
        let location = location
            .map(keys::normalize_location)
            .filter(|l| !l.is_empty());

        match self.price_from_index(min, max, location.as_deref()).await {
            Ok(Some(views)) => {
                self.record(SearchPath::Index);
                return Ok(views);
            }
            Ok(None) => tracing::debug!(min, max, "Price range not indexed, using primary store"),
            Err(e) => tracing::warn!(min, max, error = %e, "Index lookup failed, using primary store"),
        }

        let records = self
            .shows
            .by_price_range(min, max, location.as_deref())
            .await?;
        self.record(SearchPath::Fallback);
        Ok(self.views_with_refresh(records))
    }

    /// Index coverage statistics, or primary store counts when the index is down.
    ///
    /// # Errors
    ///
    /// [`TheaterError::Store`] when the index is down and the primary store fails.
    pub async fn statistics(&self) -> Result<SearchStatistics, TheaterError> {
        match self.index_statistics().await {
            Ok(stats) => Ok(stats),
            Err(e) => {
                tracing::warn!(error = %e, "Index statistics unavailable, counting primary store");
                let primary = self.shows.statistics().await?;
                Ok(SearchStatistics {
                    total_shows: primary.total_shows,
                    indexed_in_price: None,
                    indexed_in_availability: None,
                    by_location: primary.by_location,
                    source: StatisticsSource::PrimaryStore,
                })
            }
        }
    }

    async fn search_index(&self, criteria: &SearchCriteria) -> IndexResult<SearchResult> {
        let candidates = self.resolve_candidates(criteria).await?;
        let tokens = criteria.term_tokens().unwrap_or_default();

        let mut views: Vec<ShowView> = self
            .hydrate(candidates)
            .await?
            .into_iter()
            .filter(|view| {
                tokens.is_empty() || {
                    let terms = show_terms(&view.name, &view.details);
                    tokens.iter().all(|t| terms.contains(t))
                }
            })
            .collect();
        sort_by_name(&mut views);

        Ok(SearchResult::paginate(views, criteria.page, criteria.page_size))
    }

    async fn resolve_candidates(&self, criteria: &SearchCriteria) -> IndexResult<HashSet<String>> {
        let mut sets: Vec<HashSet<String>> = Vec::new();

        if !criteria.is_index_eligible() {
            sets.push(self.index.set_members(keys::ALL_SHOWS).await?);
        }

        if let Some(location) = &criteria.location {
            let members = self.index.set_members(&keys::location(location)).await?;
            if members.is_empty() {
                return Ok(HashSet::new());
            }
            sets.push(members);
        }

        if criteria.min_price.is_some() || criteria.max_price.is_some() {
            let range = ScoreRange::between(criteria.min_price, criteria.max_price);
            let members = self.range(keys::PRICE, range).await?;
            if members.is_empty() {
                return Ok(HashSet::new());
            }
            sets.push(members);
        }

        // The availability score is the freshest availability the index has;
        // `update_availability` rewrites it without touching the snapshot.
        let min_available = match (criteria.min_available, criteria.only_available) {
            (Some(min), true) => Some(min.max(1)),
            (Some(min), false) => Some(min),
            (None, true) => Some(1),
            (None, false) => None,
        };
        if let Some(min) = min_available {
            let members = self.range(keys::AVAILABILITY, ScoreRange::at_least(min)).await?;
            if members.is_empty() {
                return Ok(HashSet::new());
            }
            sets.push(members);
        }

        if let Some(tokens) = criteria.term_tokens() {
            if tokens.is_empty() {
                return Ok(HashSet::new());
            }
            let term_keys: Vec<String> = tokens.iter().map(|t| keys::term(t)).collect();
            let members = self.index.intersect(&term_keys).await?;
            if members.is_empty() {
                return Ok(HashSet::new());
            }
            sets.push(members);
        }

        Ok(intersect_all(sets))
    }

    async fn range(&self, key: &str, range: ScoreRange) -> IndexResult<HashSet<String>> {
        Ok(self
            .index
            .range_by_score(key, range)
            .await?
            .into_iter()
            .collect())
    }

    /// Batch-fetch snapshots with their current availability score.
    ///
    /// Ids without a snapshot are dropped.
    async fn hydrate(&self, ids: HashSet<String>) -> IndexResult<Vec<ShowView>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut ids: Vec<String> = ids.into_iter().collect();
        ids.sort();
        let snapshot_keys: Vec<String> = ids.iter().map(keys::snapshot).collect();
        let snapshots = self.index.get_many(&snapshot_keys).await?;
        let scores = self.index.scores(keys::AVAILABILITY, &ids).await?;

        let mut views = Vec::with_capacity(ids.len());
        for ((id, snapshot), score) in ids.iter().zip(snapshots).zip(scores) {
            let Some(json) = snapshot else {
                tracing::debug!(show_id = %id, "Snapshot missing, dropping stale index entry");
                continue;
            };
            let mut view = serde_json::from_str::<ShowView>(&json)
                .map_err(|e| IndexError::Corrupt(format!("snapshot for show {id}: {e}")))?;
            if let Some(available) = score.and_then(score_to_count) {
                view.available_tickets = available;
            }
            views.push(view);
        }
        Ok(views)
    }

    async fn location_from_index(
        &self,
        location: &str,
        only_available: bool,
    ) -> IndexResult<Option<Vec<ShowView>>> {
        let mut ids = self.index.set_members(&keys::location(location)).await?;
        if ids.is_empty() {
            return Ok(None);
        }
        if only_available {
            let available = self.range(keys::AVAILABILITY, ScoreRange::at_least(1)).await?;
            ids.retain(|id| available.contains(id));
        }

        let mut views = self.hydrate(ids).await?;
        sort_by_name(&mut views);
        Ok(Some(views))
    }

    async fn price_from_index(
        &self,
        min: u32,
        max: u32,
        location: Option<&str>,
    ) -> IndexResult<Option<Vec<ShowView>>> {
        let mut ids = self
            .range(keys::PRICE, ScoreRange::between(Some(min), Some(max)))
            .await?;
        if ids.is_empty() {
            return Ok(None);
        }
        if let Some(location) = location {
            let at_location = self.index.set_members(&keys::location(location)).await?;
            ids.retain(|id| at_location.contains(id));
        }

        let mut views = self.hydrate(ids).await?;
        views.sort_by(|a, b| {
            a.price
                .cmp(&b.price)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(Some(views))
    }

    async fn index_statistics(&self) -> IndexResult<SearchStatistics> {
        let total_shows = self.index.set_card(keys::ALL_SHOWS).await?;
        let indexed_in_price = self.index.sorted_card(keys::PRICE).await?;
        let indexed_in_availability = self.index.sorted_card(keys::AVAILABILITY).await?;

        let mut by_location = BTreeMap::new();
        for key in self.index.scan_prefix(keys::LOCATION_PREFIX).await? {
            let count = self.index.set_card(&key).await?;
            if let Some(location) = key.strip_prefix(keys::LOCATION_PREFIX) {
                by_location.insert(location.to_string(), count);
            }
        }

        Ok(SearchStatistics {
            total_shows,
            indexed_in_price: Some(indexed_in_price),
            indexed_in_availability: Some(indexed_in_availability),
            by_location,
            source: StatisticsSource::Index,
        })
    }

    async fn search_primary(&self, criteria: &SearchCriteria) -> Result<SearchResult, TheaterError> {
        let (records, total) = self.shows.search(criteria).await?;
        let items = self.views_with_refresh(records);
        Ok(SearchResult::new(items, total, criteria.page, criteria.page_size))
    }

    /// Flatten fallback records, queueing each for re-projection.
    fn views_with_refresh(&self, records: Vec<ShowRecord>) -> Vec<ShowView> {
        records
            .into_iter()
            .map(|record| {
                let view = record.view();
                let indexer = self.indexer.clone();
                self.refresh.submit(async move {
                    indexer.index_show(&record).await;
                });
                view
            })
            .collect()
    }

    fn record(&self, path: SearchPath) -> SearchPath {
        metrics::counter!("theater_search_total", "path" => path.label()).increment(1);
        path
    }
}

/// Intersect candidate sets, smallest first.
///
/// No sets means no constraint was resolved, which yields nothing.
#[must_use]
pub fn intersect_all(mut sets: Vec<HashSet<String>>) -> HashSet<String> {
    sets.sort_by_key(HashSet::len);
    let mut sets = sets.into_iter();
    let Some(mut result) = sets.next() else {
        return HashSet::new();
    };
    for set in sets {
        if result.is_empty() {
            break;
        }
        result.retain(|id| set.contains(id));
    }
    result
}

/// A ticket count stored as a sorted-set score.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // range checked
fn score_to_count(score: f64) -> Option<u32> {
    (score.is_finite() && (0.0..=f64::from(u32::MAX)).contains(&score)).then(|| score as u32)
}

fn sort_by_name(views: &mut [ShowView]) {
    views.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
}
