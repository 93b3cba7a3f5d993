//! Primary record store boundary.
//!
//! The primary record store is the single source of truth for existence and
//! ticket counts. Everything the index store holds is derived from it.
//!
//! Capacity-sensitive updates ([`ShowStore::reserve_tickets`],
//! [`ShowStore::set_booked_tickets`], [`ShowStore::update_attributes`],
//! [`BookingStore::transition_status`]) are
//! single conditional writes at the store, so concurrent callers cannot both
//! pass a check and overbook.

use crate::booking::{Booking, BookingFilter, BookingId, BookingStats, BookingStatus, ContactType};
use crate::search::SearchCriteria;
use crate::show::{ShowId, ShowRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Error type for primary record store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No row with this key
    #[error("{entity} with id {id} not found")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Requested identifier
        id: String,
    },

    /// Conditional ticket update rejected
    #[error("Requested {requested} tickets but only {available} available")]
    CapacityExceeded {
        /// Tickets asked for
        requested: u32,
        /// Tickets left
        available: u32,
    },

    /// Unique key clash or failed state precondition
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Driver or connection failure
    #[error("Database error: {0}")]
    Database(String),

    /// Row could not be mapped
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Shorthand for [`StoreError::NotFound`].
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Boxed future returned by store methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// A record kept in the primary store and mirrored in the record cache.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Primary key type
    type Id: fmt::Display + Clone + Send + Sync + 'static;

    /// Entity kind, used in cache keys and not-found errors.
    const KIND: &'static str;

    /// Primary key of this record.
    fn id(&self) -> &Self::Id;

    /// Record cache key: `cache:{kind}:{id}`.
    fn cache_key(id: &Self::Id) -> String {
        format!("cache:{}:{id}", Self::KIND)
    }
}

impl Entity for ShowRecord {
    type Id = ShowId;
    const KIND: &'static str = "show";

    fn id(&self) -> &ShowId {
        &self.id
    }
}

impl Entity for Booking {
    type Id = BookingId;
    const KIND: &'static str = "booking";

    fn id(&self) -> &BookingId {
        &self.id
    }
}

/// Key-based access to one entity table.
///
/// # Dyn Compatibility
///
/// Methods return `Pin<Box<dyn Future>>` so that services can hold
/// `Arc<dyn ShowStore>` / `Arc<dyn BookingStore>`.
pub trait RecordStore<E: Entity>: Send + Sync {
    /// Insert a new record.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when the key already exists.
    fn insert<'a>(&'a self, entity: &'a E) -> StoreFuture<'a, ()>;

    /// Overwrite an existing record.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when no record has this key.
    fn update<'a>(&'a self, entity: &'a E) -> StoreFuture<'a, ()>;

    /// Load a record by key.
    fn fetch<'a>(&'a self, id: &'a E::Id) -> StoreFuture<'a, Option<E>>;

    /// Delete a record by key.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when no record has this key.
    fn remove<'a>(&'a self, id: &'a E::Id) -> StoreFuture<'a, ()>;
}

/// Show counts computed by the primary store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrimaryStatistics {
    /// Number of shows
    pub total_shows: u64,
    /// Shows per normalized location
    pub by_location: BTreeMap<String, u64>,
}

/// Show table queries beyond key access.
pub trait ShowStore: RecordStore<ShowRecord> {
    /// Filtered page plus the total match count for the same predicate.
    ///
    /// Ordered by creation time, newest first. A term that yields no token
    /// matches nothing.
    fn search<'a>(&'a self, criteria: &'a SearchCriteria) -> StoreFuture<'a, (Vec<ShowRecord>, u64)>;

    /// Shows at a normalized location, newest first.
    fn by_location<'a>(
        &'a self,
        location: &'a str,
        only_available: bool,
    ) -> StoreFuture<'a, Vec<ShowRecord>>;

    /// Shows priced within `[min, max]`, optionally at a normalized location,
    /// cheapest first.
    fn by_price_range<'a>(
        &'a self,
        min: u32,
        max: u32,
        location: Option<&'a str>,
    ) -> StoreFuture<'a, Vec<ShowRecord>>;

    /// Overwrite name, details, price, total and location in one conditional
    /// write and return the stored row.
    ///
    /// The booked count is left as stored unless `booked` is given. The write
    /// only applies if the resulting booked count fits the new total, checked
    /// against the row as it is at write time.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown show, [`StoreError::Conflict`]
    /// when the booked count would exceed the new total.
    fn update_attributes<'a>(
        &'a self,
        show: &'a ShowRecord,
        booked: Option<u32>,
    ) -> StoreFuture<'a, ShowRecord>;

    /// Atomically add `tickets` to the booked count if they fit.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown show, [`StoreError::CapacityExceeded`]
    /// when `booked + tickets > total`.
    fn reserve_tickets<'a>(
        &'a self,
        id: &'a ShowId,
        tickets: u32,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, ShowRecord>;

    /// Atomically subtract `tickets` from the booked count, floored at zero.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown show.
    fn release_tickets<'a>(
        &'a self,
        id: &'a ShowId,
        tickets: u32,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, ShowRecord>;

    /// Atomically set the booked count if it does not exceed the total.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown show, [`StoreError::CapacityExceeded`]
    /// when `booked > total`.
    fn set_booked_tickets<'a>(
        &'a self,
        id: &'a ShowId,
        booked: u32,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, ShowRecord>;

    /// Show totals straight from the table.
    fn statistics(&self) -> StoreFuture<'_, PrimaryStatistics>;
}

/// Booking table queries beyond key access.
pub trait BookingStore: RecordStore<Booking> {
    /// Filtered page (newest first) plus the total match count.
    fn search<'a>(&'a self, filter: &'a BookingFilter) -> StoreFuture<'a, (Vec<Booking>, u64)>;

    /// All bookings for a show, newest first.
    fn by_show<'a>(&'a self, show_id: &'a ShowId) -> StoreFuture<'a, Vec<Booking>>;

    /// All bookings for a contact, newest first.
    fn by_contact<'a>(
        &'a self,
        contact_type: ContactType,
        contact_value: &'a str,
    ) -> StoreFuture<'a, Vec<Booking>>;

    /// Seats held by pending and confirmed bookings of a show.
    fn tickets_sold<'a>(&'a self, show_id: &'a ShowId) -> StoreFuture<'a, u64>;

    /// Global aggregates.
    fn stats(&self) -> StoreFuture<'_, BookingStats>;

    /// Atomically move a booking from `from` to `to`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown booking, [`StoreError::Conflict`]
    /// when the booking is no longer in `from`.
    fn transition_status<'a>(
        &'a self,
        id: &'a BookingId,
        from: BookingStatus,
        to: BookingStatus,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, Booking>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_keys_are_namespaced_by_kind() {
        let show = ShowId::new();
        assert_eq!(ShowRecord::cache_key(&show), format!("cache:show:{show}"));

        let booking = BookingId::new("BK-0123456789ABCDEF");
        assert_eq!(Booking::cache_key(&booking), "cache:booking:BK-0123456789ABCDEF");
    }
}
