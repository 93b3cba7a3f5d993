//! Booking API endpoints.
//!
//! - POST   /api/bookings              - Book tickets
//! - GET    /api/bookings              - Filtered, paginated listing
//! - GET    /api/bookings/stats        - Global aggregates
//! - GET    /api/bookings/contact      - Bookings for a contact
//! - GET    /api/bookings/:id          - Booking details
//! - DELETE /api/bookings/:id          - Delete a booking
//! - PUT    /api/bookings/:id/status   - Change status
//! - POST   /api/bookings/:id/confirm  - Confirm
//! - POST   /api/bookings/:id/cancel   - Cancel and release seats

use super::shows::{Deleted, parse_show_id};
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use theater_core::booking::{
    Booking, BookingFilter, BookingId, BookingStats, BookingStatus, ContactType, NewBooking,
};
use theater_web::{ApiResponse, AppError, Pagination, WebResult};

/// Query parameters for `GET /api/bookings`.
#[derive(Debug, Default, Deserialize)]
pub struct BookingQuery {
    /// Show filter
    pub show_id: Option<String>,
    /// Contact channel filter
    pub contact_type: Option<ContactType>,
    /// Status filter
    pub status: Option<BookingStatus>,
    /// Booked at or after (RFC 3339)
    pub date_from: Option<DateTime<Utc>>,
    /// Booked at or before (RFC 3339)
    pub date_to: Option<DateTime<Utc>>,
    /// Page size
    pub limit: Option<u32>,
    /// Rows to skip
    pub offset: Option<u32>,
}

impl BookingQuery {
    fn into_filter(self) -> Result<BookingFilter, AppError> {
        let show_id = self.show_id.as_deref().map(parse_show_id).transpose()?;
        Ok(BookingFilter {
            show_id,
            contact_type: self.contact_type,
            status: self.status,
            date_from: self.date_from,
            date_to: self.date_to,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

/// Query parameters for a contact lookup.
#[derive(Debug, Deserialize)]
pub struct ContactQuery {
    /// Channel
    pub contact_type: ContactType,
    /// Email address or phone number
    pub contact_value: String,
}

/// Request body for a status change.
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    /// Target status (`pending`, `confirmed` or `cancelled`)
    pub status: String,
}

/// Book tickets.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/bookings \
///   -H "Content-Type: application/json" \
///   -d '{"show_id":"…","contact_type":"email","contact_value":"ada@example.com","tickets":2}'
/// ```
///
/// Returns 409 with code `CAPACITY_EXCEEDED` when the seats are gone.
pub async fn create_booking(
    State(state): State<AppState>,
    payload: Result<Json<NewBooking>, JsonRejection>,
) -> Result<(StatusCode, ApiResponse<Booking>), AppError> {
    let Json(request) = payload?;
    let booking = state.bookings.create_booking(request).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message(booking, "Booking created successfully"),
    ))
}

/// Filtered listing, newest first.
pub async fn list_bookings(
    State(state): State<AppState>,
    query: Result<Query<BookingQuery>, QueryRejection>,
) -> WebResult<Booking> {
    let Query(query) = query?;
    let filter = query.into_filter()?;
    let (limit, offset) = (filter.limit(), filter.offset());
    let (bookings, total) = state.bookings.search_bookings(filter).await?;
    Ok(ApiResponse::paginated(
        bookings,
        Pagination::from_offset(total, limit, offset),
    ))
}

/// Global aggregates.
pub async fn booking_stats(State(state): State<AppState>) -> WebResult<BookingStats> {
    Ok(ApiResponse::success(state.bookings.booking_stats().await?))
}

/// Bookings made with a given contact.
pub async fn bookings_by_contact(
    State(state): State<AppState>,
    query: Result<Query<ContactQuery>, QueryRejection>,
) -> WebResult<Vec<Booking>> {
    let Query(query) = query?;
    let bookings = state
        .bookings
        .bookings_by_contact(query.contact_type, &query.contact_value)
        .await?;
    Ok(ApiResponse::success(bookings))
}

/// Booking details.
pub async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> WebResult<Booking> {
    let id = BookingId::new(id);
    Ok(ApiResponse::success(state.bookings.get_booking(&id).await?))
}

/// Change status.
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> WebResult<Booking> {
    let Json(request) = payload?;
    let status = request.status.parse::<BookingStatus>()?;
    let booking = state
        .bookings
        .update_status(&BookingId::new(id), status)
        .await?;
    Ok(ApiResponse::with_message(booking, "Booking status updated"))
}

/// Confirm a booking.
pub async fn confirm_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> WebResult<Booking> {
    let booking = state.bookings.confirm(&BookingId::new(id)).await?;
    Ok(ApiResponse::with_message(booking, "Booking confirmed"))
}

/// Cancel a booking and release its seats.
pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> WebResult<Booking> {
    let booking = state.bookings.cancel(&BookingId::new(id)).await?;
    Ok(ApiResponse::with_message(booking, "Booking cancelled"))
}

/// Delete a booking.
pub async fn delete_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> WebResult<Deleted> {
    state.bookings.delete_booking(&BookingId::new(id.clone())).await?;
    Ok(ApiResponse::with_message(Deleted { id }, "Booking deleted successfully"))
}
