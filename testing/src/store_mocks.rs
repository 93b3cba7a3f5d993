//! In-memory record store testing utilities
//!
//! - [`InMemoryShowStore`]: show table with the same filter semantics as the
//!   Postgres store
//! - [`InMemoryBookingStore`]: booking table with switchable insert failures

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use theater_core::booking::{
    Booking, BookingFilter, BookingId, BookingStats, BookingStatus, ContactType, ShowBookingCount,
    StatusCounts,
};
use theater_core::index::keys::normalize_location;
use theater_core::search::SearchCriteria;
use theater_core::show::{ShowId, ShowRecord};
use theater_core::store::{
    BookingStore, PrimaryStatistics, RecordStore, ShowStore, StoreError, StoreFuture,
};

fn page<T>(items: Vec<T>, offset: u64, limit: u64) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(usize::MAX);
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    items.into_iter().skip(offset).take(limit).collect()
}

/// In-memory show table.
///
/// # Example
///
/// ```
/// use theater_testing::{InMemoryShowStore, fixtures};
/// use theater_core::store::RecordStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryShowStore::new();
/// let show = fixtures::show("Swan Lake", "Downtown", 100, 50);
///
/// store.insert(&show).await?;
/// assert!(store.fetch(&show.id).await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryShowStore {
    shows: Arc<RwLock<HashMap<ShowId, ShowRecord>>>,
}

impl InMemoryShowStore {
    /// Create a new empty show store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored shows
    #[must_use]
    pub fn len(&self) -> usize {
        self.shows.read().unwrap().len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shows.read().unwrap().is_empty()
    }

    /// Direct read, bypassing the trait.
    #[must_use]
    pub fn snapshot(&self, id: &ShowId) -> Option<ShowRecord> {
        self.shows.read().unwrap().get(id).cloned()
    }

    fn newest_first(mut shows: Vec<ShowRecord>) -> Vec<ShowRecord> {
        shows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        shows
    }

    fn modify(
        &self,
        id: &ShowId,
        now: DateTime<Utc>,
        change: impl FnOnce(&mut ShowRecord) -> Result<(), StoreError>,
    ) -> Result<ShowRecord, StoreError> {
        let mut shows = self.shows.write().unwrap();
        let record = shows
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("show", id))?;
        change(record)?;
        record.updated_at = now;
        Ok(record.clone())
    }
}

impl RecordStore<ShowRecord> for InMemoryShowStore {
    fn insert<'a>(&'a self, entity: &'a ShowRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut shows = self.shows.write().unwrap();
            if shows.contains_key(&entity.id) {
                return Err(StoreError::Conflict(format!("show {} already exists", entity.id)));
            }
            shows.insert(entity.id, entity.clone());
            Ok(())
        })
    }

    fn update<'a>(&'a self, entity: &'a ShowRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.update_attributes(entity, None).await?;
            Ok(())
        })
    }

    fn fetch<'a>(&'a self, id: &'a ShowId) -> StoreFuture<'a, Option<ShowRecord>> {
        Box::pin(async move { Ok(self.snapshot(id)) })
    }

    fn remove<'a>(&'a self, id: &'a ShowId) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.shows
                .write()
                .unwrap()
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| StoreError::not_found("show", id))
        })
    }
}

impl ShowStore for InMemoryShowStore {
    fn search<'a>(&'a self, criteria: &'a SearchCriteria) -> StoreFuture<'a, (Vec<ShowRecord>, u64)> {
        Box::pin(async move {
            let matches: Vec<ShowRecord> = self
                .shows
                .read()
                .unwrap()
                .values()
                .filter(|show| criteria.matches_view(&show.view()))
                .cloned()
                .collect();
            let total = matches.len() as u64;
            let items = page(
                Self::newest_first(matches),
                criteria.offset(),
                u64::from(criteria.page_size),
            );
            Ok((items, total))
        })
    }

    fn by_location<'a>(
        &'a self,
        location: &'a str,
        only_available: bool,
    ) -> StoreFuture<'a, Vec<ShowRecord>> {
        Box::pin(async move {
            let location = normalize_location(location);
            let matches = self
                .shows
                .read()
                .unwrap()
                .values()
                .filter(|show| normalize_location(&show.location) == location)
                .filter(|show| !only_available || show.has_availability())
                .cloned()
                .collect();
            Ok(Self::newest_first(matches))
        })
    }

    fn by_price_range<'a>(
        &'a self,
        min: u32,
        max: u32,
        location: Option<&'a str>,
    ) -> StoreFuture<'a, Vec<ShowRecord>> {
        Box::pin(async move {
            let location = location.map(normalize_location);
            let mut matches: Vec<ShowRecord> = self
                .shows
                .read()
                .unwrap()
                .values()
                .filter(|show| (min..=max).contains(&show.price))
                .filter(|show| {
                    location
                        .as_ref()
                        .is_none_or(|loc| normalize_location(&show.location) == *loc)
                })
                .cloned()
                .collect();
            matches.sort_by(|a, b| a.price.cmp(&b.price).then_with(|| a.name.cmp(&b.name)));
            Ok(matches)
        })
    }

    fn update_attributes<'a>(
        &'a self,
        show: &'a ShowRecord,
        booked: Option<u32>,
    ) -> StoreFuture<'a, ShowRecord> {
        Box::pin(async move {
            self.modify(&show.id, show.updated_at, |current| {
                let booked = booked.unwrap_or(current.booked_tickets);
                if booked > show.total_tickets {
                    return Err(StoreError::Conflict(format!(
                        "{booked} booked tickets exceed the new total of {}",
                        show.total_tickets
                    )));
                }
                current.name.clone_from(&show.name);
                current.details.clone_from(&show.details);
                current.price = show.price;
                current.total_tickets = show.total_tickets;
                current.booked_tickets = booked;
                current.location.clone_from(&show.location);
                Ok(())
            })
        })
    }

    fn reserve_tickets<'a>(
        &'a self,
        id: &'a ShowId,
        tickets: u32,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, ShowRecord> {
        Box::pin(async move {
            self.modify(id, now, |show| {
                let available = show.available_tickets();
                if tickets > available {
                    return Err(StoreError::CapacityExceeded {
                        requested: tickets,
                        available,
                    });
                }
                show.booked_tickets += tickets;
                Ok(())
            })
        })
    }

    fn release_tickets<'a>(
        &'a self,
        id: &'a ShowId,
        tickets: u32,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, ShowRecord> {
        Box::pin(async move {
            self.modify(id, now, |show| {
                show.booked_tickets = show.booked_tickets.saturating_sub(tickets);
                Ok(())
            })
        })
    }

    fn set_booked_tickets<'a>(
        &'a self,
        id: &'a ShowId,
        booked: u32,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, ShowRecord> {
        Box::pin(async move {
            self.modify(id, now, |show| {
                if booked > show.total_tickets {
                    return Err(StoreError::CapacityExceeded {
                        requested: booked,
                        available: show.total_tickets,
                    });
                }
                show.booked_tickets = booked;
                Ok(())
            })
        })
    }

    fn statistics(&self) -> StoreFuture<'_, PrimaryStatistics> {
        Box::pin(async move {
            let shows = self.shows.read().unwrap();
            let mut by_location = BTreeMap::new();
            for show in shows.values() {
                *by_location.entry(normalize_location(&show.location)).or_insert(0) += 1;
            }
            Ok(PrimaryStatistics {
                total_shows: shows.len() as u64,
                by_location,
            })
        })
    }
}

/// In-memory booking table.
///
/// [`InMemoryBookingStore::fail_inserts`] makes every subsequent insert fail
/// with a database error, to exercise compensation paths.
#[derive(Clone, Debug, Default)]
pub struct InMemoryBookingStore {
    bookings: Arc<RwLock<HashMap<BookingId, Booking>>>,
    fail_inserts: Arc<AtomicBool>,
}

impl InMemoryBookingStore {
    /// Create a new empty booking store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make inserts fail (or succeed again).
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Number of stored bookings
    #[must_use]
    pub fn len(&self) -> usize {
        self.bookings.read().unwrap().len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bookings.read().unwrap().is_empty()
    }

    fn newest_first(mut bookings: Vec<Booking>) -> Vec<Booking> {
        bookings.sort_by(|a, b| b.booked_at.cmp(&a.booked_at).then_with(|| a.id.cmp(&b.id)));
        bookings
    }

    fn collect(&self, keep: impl Fn(&Booking) -> bool) -> Vec<Booking> {
        let matches = self
            .bookings
            .read()
            .unwrap()
            .values()
            .filter(|b| keep(b))
            .cloned()
            .collect();
        Self::newest_first(matches)
    }
}

impl RecordStore<Booking> for InMemoryBookingStore {
    fn insert<'a>(&'a self, entity: &'a Booking) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if self.fail_inserts.load(Ordering::SeqCst) {
                return Err(StoreError::Database("insert rejected".to_string()));
            }
            let mut bookings = self.bookings.write().unwrap();
            if bookings.contains_key(&entity.id) {
                return Err(StoreError::Conflict(format!(
                    "booking {} already exists",
                    entity.id
                )));
            }
            bookings.insert(entity.id.clone(), entity.clone());
            Ok(())
        })
    }

    fn update<'a>(&'a self, entity: &'a Booking) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut bookings = self.bookings.write().unwrap();
            let slot = bookings
                .get_mut(&entity.id)
                .ok_or_else(|| StoreError::not_found("booking", &entity.id))?;
            *slot = entity.clone();
            Ok(())
        })
    }

    fn fetch<'a>(&'a self, id: &'a BookingId) -> StoreFuture<'a, Option<Booking>> {
        Box::pin(async move { Ok(self.bookings.read().unwrap().get(id).cloned()) })
    }

    fn remove<'a>(&'a self, id: &'a BookingId) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.bookings
                .write()
                .unwrap()
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| StoreError::not_found("booking", id))
        })
    }
}

impl BookingStore for InMemoryBookingStore {
    fn search<'a>(&'a self, filter: &'a BookingFilter) -> StoreFuture<'a, (Vec<Booking>, u64)> {
        Box::pin(async move {
            let matches = self.collect(|b| filter.matches(b));
            let total = matches.len() as u64;
            let items = page(
                matches,
                u64::from(filter.offset()),
                u64::from(filter.limit()),
            );
            Ok((items, total))
        })
    }

    fn by_show<'a>(&'a self, show_id: &'a ShowId) -> StoreFuture<'a, Vec<Booking>> {
        Box::pin(async move { Ok(self.collect(|b| b.show_id == *show_id)) })
    }

    fn by_contact<'a>(
        &'a self,
        contact_type: ContactType,
        contact_value: &'a str,
    ) -> StoreFuture<'a, Vec<Booking>> {
        Box::pin(async move {
            Ok(self.collect(|b| b.contact_type == contact_type && b.contact_value == contact_value))
        })
    }

    fn tickets_sold<'a>(&'a self, show_id: &'a ShowId) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            Ok(self
                .bookings
                .read()
                .unwrap()
                .values()
                .filter(|b| b.show_id == *show_id && b.status.is_active())
                .map(|b| u64::from(b.tickets))
                .sum())
        })
    }

    fn stats(&self) -> StoreFuture<'_, BookingStats> {
        Box::pin(async move {
            let all = self.collect(|_| true);
            let mut by_status = StatusCounts::default();
            let mut per_show: HashMap<ShowId, u64> = HashMap::new();
            for booking in &all {
                by_status.record(booking.status);
                *per_show.entry(booking.show_id).or_insert(0) += 1;
            }
            let mut top_shows: Vec<ShowBookingCount> = per_show
                .into_iter()
                .map(|(show_id, bookings)| ShowBookingCount { show_id, bookings })
                .collect();
            top_shows.sort_by(|a, b| b.bookings.cmp(&a.bookings).then_with(|| a.show_id.cmp(&b.show_id)));
            top_shows.truncate(10);

            Ok(BookingStats {
                total_bookings: all.len() as u64,
                total_tickets: all.iter().map(|b| u64::from(b.tickets)).sum(),
                total_revenue: all.iter().map(|b| b.total_amount).sum(),
                by_status,
                top_shows,
                recent: all.into_iter().take(10).collect(),
            })
        })
    }

    fn transition_status<'a>(
        &'a self,
        id: &'a BookingId,
        from: BookingStatus,
        to: BookingStatus,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, Booking> {
        Box::pin(async move {
            let mut bookings = self.bookings.write().unwrap();
            let booking = bookings
                .get_mut(id)
                .ok_or_else(|| StoreError::not_found("booking", id))?;
            if booking.status != from {
                return Err(StoreError::Conflict(format!(
                    "booking {id} is {}, expected {from}",
                    booking.status
                )));
            }
            booking.status = to;
            booking.updated_at = now;
            Ok(booking.clone())
        })
    }
}
