//! Booking lifecycle.
//!
//! Seats are reserved with a single conditional update at the primary store
//! before the booking row is written. If the booking cannot be persisted the
//! reservation is released again.
//!
//! ```text
//! create_booking
//!   validate ──▶ reserve_tickets ──▶ insert booking ──▶ refresh cache + availability score
//!                     │ full              │ failed
//!                     ▼                   ▼
//!              CapacityExceeded     release_tickets, return error
//! ```

use chrono::{DateTime, Utc};
use std::sync::Arc;
use theater_core::TheaterError;
use theater_core::booking::{
    Booking, BookingFilter, BookingId, BookingStats, BookingStatus, ContactType, NewBooking,
    ShowBookingSummary, StatusCounts,
};
use theater_core::environment::Clock;
use theater_core::error::Result;
use theater_core::show::{ShowId, ShowRecord};
use theater_core::store::{BookingStore, ShowStore};
use theater_projections::{CachedRepository, ShowIndexer};

use crate::metrics::record_booking;

/// Bookings listed in a show summary.
const SUMMARY_RECENT: usize = 5;

/// Booking service.
#[derive(Clone)]
pub struct BookingService {
    bookings: CachedRepository<Booking, dyn BookingStore>,
    shows: CachedRepository<ShowRecord, dyn ShowStore>,
    indexer: ShowIndexer,
    clock: Arc<dyn Clock>,
}

impl BookingService {
    /// Create the service.
    #[must_use]
    pub fn new(
        bookings: CachedRepository<Booking, dyn BookingStore>,
        shows: CachedRepository<ShowRecord, dyn ShowStore>,
        indexer: ShowIndexer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bookings,
            shows,
            indexer,
            clock,
        }
    }

    /// Reserve seats and record a pending booking.
    ///
    /// # Errors
    ///
    /// - [`TheaterError::Validation`] for zero tickets or a malformed contact
    /// - [`TheaterError::NotFound`] for an unknown show
    /// - [`TheaterError::CapacityExceeded`] when the seats are not available
    /// - [`TheaterError::Store`] if the booking cannot be written (the seats
    ///   are released again)
    pub async fn create_booking(&self, request: NewBooking) -> Result<Booking> {
        request.validate()?;
        let show_id = request.show_id;
        let tickets = request.tickets;
        let now = self.clock.now();

        let reserved = match self
            .shows
            .primary()
            .reserve_tickets(&show_id, tickets, now)
            .await
        {
            Ok(show) => show,
            Err(e) => {
                let err = TheaterError::from(e);
                if matches!(err, TheaterError::CapacityExceeded { .. }) {
                    record_booking("rejected");
                    tracing::info!(show_id = %show_id, tickets, "Booking rejected, not enough seats");
                }
                return Err(err);
            }
        };

        let booking = request.into_booking(reserved.price, now);
        if let Err(e) = self.bookings.create(&booking).await {
            tracing::warn!(
                booking_id = %booking.id,
                show_id = %show_id,
                error = %e,
                "Booking write failed, releasing reserved seats"
            );
            self.release_seats(&show_id, tickets, now).await;
            return Err(e);
        }

        self.shows.refresh(&reserved).await;
        self.indexer
            .update_availability(&show_id, reserved.available_tickets())
            .await;

        record_booking("created");
        tracing::info!(
            booking_id = %booking.id,
            show_id = %show_id,
            tickets,
            total_amount = booking.total_amount,
            "Booking created"
        );
        Ok(booking)
    }

    /// Fetch a booking, read-through the record cache.
    ///
    /// # Errors
    ///
    /// [`TheaterError::NotFound`] for an unknown id.
    pub async fn get_booking(&self, id: &BookingId) -> Result<Booking> {
        self.bookings.get(id).await
    }

    /// All bookings for a show, newest first.
    ///
    /// # Errors
    ///
    /// [`TheaterError::Store`] on primary store failure.
    pub async fn bookings_by_show(&self, show_id: &ShowId) -> Result<Vec<Booking>> {
        Ok(self.bookings.primary().by_show(show_id).await?)
    }

    /// All bookings for a contact, newest first.
    ///
    /// # Errors
    ///
    /// [`TheaterError::Validation`] for a blank contact value.
    pub async fn bookings_by_contact(
        &self,
        contact_type: ContactType,
        contact_value: &str,
    ) -> Result<Vec<Booking>> {
        let value = contact_value.trim();
        if value.is_empty() {
            return Err(TheaterError::Validation(
                "contact value cannot be empty".to_string(),
            ));
        }
        Ok(self.bookings.primary().by_contact(contact_type, value).await?)
    }

    /// Filtered page of bookings plus the total match count.
    ///
    /// # Errors
    ///
    /// [`TheaterError::Validation`] when `date_from` is after `date_to`.
    pub async fn search_bookings(&self, filter: BookingFilter) -> Result<(Vec<Booking>, u64)> {
        if let (Some(from), Some(to)) = (filter.date_from, filter.date_to) {
            if from > to {
                return Err(TheaterError::Validation(
                    "date_from cannot be after date_to".to_string(),
                ));
            }
        }
        Ok(self.bookings.primary().search(&filter).await?)
    }

    /// Global booking aggregates.
    ///
    /// # Errors
    ///
    /// [`TheaterError::Store`] on primary store failure.
    pub async fn booking_stats(&self) -> Result<BookingStats> {
        Ok(self.bookings.primary().stats().await?)
    }

    /// Sales overview of one show.
    ///
    /// # Errors
    ///
    /// [`TheaterError::NotFound`] for an unknown show.
    pub async fn show_booking_summary(&self, show_id: &ShowId) -> Result<ShowBookingSummary> {
        let show = self.shows.get(show_id).await?;
        let store = self.bookings.primary();
        let tickets_sold = store.tickets_sold(show_id).await?;
        let bookings = store.by_show(show_id).await?;

        let mut by_status = StatusCounts::default();
        let mut total_revenue = 0u64;
        for booking in &bookings {
            by_status.record(booking.status);
            if booking.status.is_active() {
                total_revenue += booking.total_amount;
            }
        }

        Ok(ShowBookingSummary {
            show_id: show.id,
            show_name: show.name,
            location: show.location,
            total_tickets: show.total_tickets,
            tickets_sold,
            tickets_available: u64::from(show.total_tickets).saturating_sub(tickets_sold),
            total_bookings: bookings.len() as u64,
            total_revenue,
            by_status,
            recent: bookings.into_iter().take(SUMMARY_RECENT).collect(),
        })
    }

    /// Check whether `tickets` seats could be booked right now.
    ///
    /// Advisory only: [`Self::create_booking`] re-checks atomically.
    ///
    /// # Errors
    ///
    /// [`TheaterError::Validation`] for zero tickets, [`TheaterError::NotFound`]
    /// for an unknown show, [`TheaterError::CapacityExceeded`] when the seats
    /// are not available.
    pub async fn validate_capacity(&self, show_id: &ShowId, tickets: u32) -> Result<()> {
        if tickets == 0 {
            return Err(TheaterError::Validation(
                "number of tickets must be greater than 0".to_string(),
            ));
        }
        let show = self.shows.load_fresh(show_id).await?;
        let available = show.available_tickets();
        if tickets > available {
            return Err(TheaterError::CapacityExceeded {
                requested: tickets,
                available,
            });
        }
        Ok(())
    }

    /// Move a booking to `status`.
    ///
    /// Cancelling an active booking gives its seats back. Setting the status
    /// a booking already has is a no-op.
    ///
    /// # Errors
    ///
    /// - [`TheaterError::Validation`] when the booking is already cancelled
    /// - [`TheaterError::NotFound`] for an unknown id
    /// - [`TheaterError::Conflict`] when a concurrent change got there first
    pub async fn update_status(&self, id: &BookingId, status: BookingStatus) -> Result<Booking> {
        let current = self.bookings.load_fresh(id).await?;

        if current.status == BookingStatus::Cancelled {
            return Err(TheaterError::Validation(format!(
                "booking {id} is cancelled and cannot change status"
            )));
        }
        if current.status == status {
            return Ok(current);
        }

        let now = self.clock.now();
        let updated = self
            .bookings
            .primary()
            .transition_status(id, current.status, status, now)
            .await?;
        self.bookings.refresh(&updated).await;

        if status == BookingStatus::Cancelled {
            self.release_seats(&updated.show_id, updated.tickets, now)
                .await;
        }

        record_booking(status.as_str());
        tracing::info!(booking_id = %id, from = %current.status, to = %status, "Booking status changed");
        Ok(updated)
    }

    /// Confirm a pending booking.
    ///
    /// # Errors
    ///
    /// Same as [`Self::update_status`].
    pub async fn confirm(&self, id: &BookingId) -> Result<Booking> {
        self.update_status(id, BookingStatus::Confirmed).await
    }

    /// Cancel a booking and release its seats.
    ///
    /// # Errors
    ///
    /// Same as [`Self::update_status`].
    pub async fn cancel(&self, id: &BookingId) -> Result<Booking> {
        self.update_status(id, BookingStatus::Cancelled).await
    }

    /// Delete a booking, releasing its seats if it was still active.
    ///
    /// # Errors
    ///
    /// [`TheaterError::NotFound`] for an unknown id.
    pub async fn delete_booking(&self, id: &BookingId) -> Result<()> {
        let booking = self.bookings.load_fresh(id).await?;
        self.bookings.delete(id).await?;

        if booking.status.is_active() {
            self.release_seats(&booking.show_id, booking.tickets, self.clock.now())
                .await;
        }

        record_booking("deleted");
        tracing::info!(booking_id = %id, "Booking deleted");
        Ok(())
    }

    /// Give seats back and re-project availability.
    ///
    /// The booking change that triggered this has already been committed, so
    /// a failure here is logged rather than returned.
    async fn release_seats(&self, show_id: &ShowId, tickets: u32, now: DateTime<Utc>) {
        match self
            .shows
            .primary()
            .release_tickets(show_id, tickets, now)
            .await
        {
            Ok(show) => {
                self.shows.refresh(&show).await;
                self.indexer
                    .update_availability(show_id, show.available_tickets())
                    .await;
            }
            Err(e) => {
                tracing::error!(show_id = %show_id, tickets, error = %e, "Failed to release seats");
            }
        }
    }
}
