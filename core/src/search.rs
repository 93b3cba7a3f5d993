//! Search criteria, paginated results and index statistics.

use crate::error::TheaterError;
use crate::index::keys;
use crate::show::ShowView;
use crate::tokenizer::{Tokens, tokenize};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Hard upper bound on page size.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page size bounds applied while normalizing criteria.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLimits {
    /// Used when no page size is given
    pub default_page_size: u32,
    /// Larger requests are clamped to this
    pub max_page_size: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

/// A multi-criterion show query.
///
/// All filters are conjunctive. Construct with struct update syntax over
/// [`SearchCriteria::default`] and pass through [`SearchCriteria::normalized`]
/// before use.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    /// Exact location, matched case-insensitively
    pub location: Option<String>,
    /// Inclusive lower price bound
    pub min_price: Option<u32>,
    /// Inclusive upper price bound
    pub max_price: Option<u32>,
    /// Inclusive lower bound on available tickets
    pub min_available: Option<u32>,
    /// Free text; every token must match (AND semantics)
    pub term: Option<String>,
    /// Drop shows with nothing left to sell
    #[serde(default)]
    pub only_available: bool,
    /// 1-based page number
    #[serde(default)]
    pub page: u32,
    /// Page size; 0 means default
    #[serde(default)]
    pub page_size: u32,
}

impl SearchCriteria {
    /// Reject contradictory criteria.
    ///
    /// # Errors
    ///
    /// Returns [`TheaterError::Validation`] when `min_price > max_price`.
    pub fn validate(&self) -> Result<(), TheaterError> {
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                return Err(TheaterError::Validation(format!(
                    "min_price ({min}) cannot be greater than max_price ({max})"
                )));
            }
        }
        Ok(())
    }

    /// Clamp paging into bounds and drop blank text filters.
    #[must_use]
    pub fn normalized(mut self, limits: PageLimits) -> Self {
        self.page = self.page.max(1);
        self.page_size = match self.page_size {
            0 => limits.default_page_size,
            size => size.min(limits.max_page_size),
        };
        self.location = self
            .location
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
        self.term = self
            .term
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        self
    }

    /// Whether at least one index-backed filter is present.
    ///
    /// `only_available` alone does not make a query index-eligible.
    #[must_use]
    pub const fn is_index_eligible(&self) -> bool {
        self.location.is_some()
            || self.min_price.is_some()
            || self.max_price.is_some()
            || self.min_available.is_some()
            || self.term.is_some()
    }

    /// Normalized location key, if a location filter is set.
    #[must_use]
    pub fn normalized_location(&self) -> Option<String> {
        self.location.as_deref().map(keys::normalize_location)
    }

    /// Tokens of the free-text filter, if one is set.
    ///
    /// `Some(empty)` means a term was given but produced no token; such a
    /// query matches nothing.
    #[must_use]
    pub fn term_tokens(&self) -> Option<Tokens> {
        self.term.as_deref().map(tokenize)
    }

    /// Rows to skip for the requested page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    /// Whether a view passes the availability-related filters.
    ///
    /// The fast path uses this after hydration, the in-memory stores use it
    /// as their full predicate together with [`Self::matches_view`].
    #[must_use]
    pub fn matches_availability(&self, available: u32) -> bool {
        (!self.only_available || available > 0)
            && self.min_available.is_none_or(|min| available >= min)
    }

    /// Full predicate over a flattened view (no index involved).
    #[must_use]
    pub fn matches_view(&self, view: &ShowView) -> bool {
        let location_ok = self
            .normalized_location()
            .is_none_or(|loc| keys::normalize_location(&view.location) == loc);
        let price_ok = self.min_price.is_none_or(|min| view.price >= min)
            && self.max_price.is_none_or(|max| view.price <= max);
        let term_ok = self.term_tokens().is_none_or(|tokens| {
            if tokens.is_empty() {
                return false;
            }
            let haystack = crate::tokenizer::show_terms(&view.name, &view.details);
            tokens.iter().all(|t| haystack.contains(t))
        });

        location_ok && price_ok && term_ok && self.matches_availability(view.available_tickets)
    }
}

/// One page of search results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Hydrated shows on this page
    pub items: Vec<ShowView>,
    /// Matches across all pages
    pub total: u64,
    /// 1-based page number
    pub page: u32,
    /// Requested page size
    pub page_size: u32,
    /// `ceil(total / page_size)`
    pub total_pages: u64,
}

impl SearchResult {
    /// Wrap an already-sliced page.
    #[must_use]
    pub fn new(items: Vec<ShowView>, total: u64, page: u32, page_size: u32) -> Self {
        Self {
            items,
            total,
            page,
            page_size,
            total_pages: total_pages(total, page_size),
        }
    }

    /// Slice a complete, ordered match list into the requested page.
    ///
    /// A page past the end is empty but still reports the full total.
    #[must_use]
    pub fn paginate(all: Vec<ShowView>, page: u32, page_size: u32) -> Self {
        let total = all.len() as u64;
        let offset = u64::from(page.saturating_sub(1)) * u64::from(page_size);
        let items = if offset >= total {
            Vec::new()
        } else {
            let start = usize::try_from(offset).unwrap_or(usize::MAX);
            all.into_iter().skip(start).take(page_size as usize).collect()
        };
        Self::new(items, total, page, page_size)
    }
}

/// `ceil(total / page_size)`; zero when there is nothing to page.
#[must_use]
pub const fn total_pages(total: u64, page_size: u32) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size as u64)
}

/// Which store answered a statistics request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticsSource {
    /// Counted from the index store
    Index,
    /// Counted from the primary record store (index unavailable)
    PrimaryStore,
}

/// Index coverage statistics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStatistics {
    /// Shows known to the answering store
    pub total_shows: u64,
    /// Entries in the price index (`None` when the index was unreachable)
    pub indexed_in_price: Option<u64>,
    /// Entries in the availability index (`None` when the index was unreachable)
    pub indexed_in_availability: Option<u64>,
    /// Shows per normalized location
    pub by_location: BTreeMap<String, u64>,
    /// Which store produced these numbers
    pub source: StatisticsSource,
}
