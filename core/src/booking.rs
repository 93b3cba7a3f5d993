//! Ticket bookings.
//!
//! Booking identifiers are derived, not random: `BK-` followed by the first
//! sixteen upper-case hex digits of a SHA-256 over the booking's identifying
//! facts. Two identical requests within the same second therefore collide,
//! which the record store reports as a conflict.

use crate::error::TheaterError;
use crate::show::ShowId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Default page size for booking listings.
pub const DEFAULT_BOOKING_LIMIT: u32 = 20;

/// Upper bound on booking listing page size.
pub const MAX_BOOKING_LIMIT: u32 = 100;

/// Hash-derived booking identifier (`BK-` + 16 hex digits).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BookingId(String);

impl BookingId {
    /// Derive the identifier for a booking request placed at `booked_at`.
    #[must_use]
    pub fn derive(
        show_id: ShowId,
        contact_type: ContactType,
        contact_value: &str,
        booked_at: DateTime<Utc>,
        tickets: u32,
    ) -> Self {
        let input = format!(
            "{show_id}:{contact_type}:{contact_value}:{}:{tickets}",
            booked_at.timestamp()
        );
        let digest = Sha256::digest(input.as_bytes());
        let hex = hex::encode_upper(digest);
        Self(format!("BK-{}", &hex[..16]))
    }

    /// Wrap an existing identifier (e.g. from a URL path).
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the customer can be reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactType {
    /// Mobile phone number
    Mobile,
    /// Email address
    Email,
}

impl ContactType {
    /// Lower-case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mobile => "mobile",
            Self::Email => "email",
        }
    }

    /// Basic plausibility check for a contact value of this kind.
    #[must_use]
    pub fn accepts(self, value: &str) -> bool {
        match self {
            Self::Mobile => {
                (10..=15).contains(&value.len()) && value.chars().any(|c| c.is_ascii_digit())
            }
            Self::Email => value.len() > 5 && value.contains('@') && value.contains('.'),
        }
    }
}

impl fmt::Display for ContactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContactType {
    type Err = TheaterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mobile" => Ok(Self::Mobile),
            "email" => Ok(Self::Email),
            other => Err(TheaterError::Validation(format!(
                "contact_type must be either 'mobile' or 'email', got '{other}'"
            ))),
        }
    }
}

/// Booking lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Seats held, awaiting confirmation
    Pending,
    /// Seats sold
    Confirmed,
    /// Seats released
    Cancelled,
}

impl BookingStatus {
    /// Lower-case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the booking currently holds seats.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = TheaterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(TheaterError::Validation(format!(
                "status must be one of pending, confirmed, cancelled; got '{other}'"
            ))),
        }
    }
}

/// A ticket booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Hash-derived identifier
    pub id: BookingId,
    /// Booked show
    pub show_id: ShowId,
    /// Contact channel
    pub contact_type: ContactType,
    /// Phone number or email address
    pub contact_value: String,
    /// Optional customer name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    /// Number of seats
    pub tickets: u32,
    /// `price * tickets` at booking time
    pub total_amount: u64,
    /// Lifecycle state
    pub status: BookingStatus,
    /// When the booking was placed
    pub booked_at: DateTime<Utc>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// Request to book seats for a show.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBooking {
    /// Show to book
    pub show_id: ShowId,
    /// Contact channel
    pub contact_type: ContactType,
    /// Phone number or email address
    pub contact_value: String,
    /// Number of seats
    pub tickets: u32,
    /// Optional customer name
    #[serde(default)]
    pub customer_name: Option<String>,
}

impl NewBooking {
    /// Check the request before any store is touched.
    ///
    /// # Errors
    ///
    /// Returns [`TheaterError::Validation`] for zero tickets or an implausible contact.
    pub fn validate(&self) -> Result<(), TheaterError> {
        if self.tickets == 0 {
            return Err(TheaterError::Validation(
                "number of tickets must be greater than 0".to_string(),
            ));
        }
        if !self.contact_type.accepts(self.contact_value.trim()) {
            return Err(TheaterError::Validation(format!(
                "invalid contact value for contact type {}",
                self.contact_type
            )));
        }
        Ok(())
    }

    /// Build the pending booking for a show priced at `price`.
    #[must_use]
    pub fn into_booking(self, price: u32, now: DateTime<Utc>) -> Booking {
        let contact_value = self.contact_value.trim().to_string();
        let id = BookingId::derive(
            self.show_id,
            self.contact_type,
            &contact_value,
            now,
            self.tickets,
        );

        Booking {
            id,
            show_id: self.show_id,
            contact_type: self.contact_type,
            contact_value,
            customer_name: self
                .customer_name
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty()),
            tickets: self.tickets,
            total_amount: u64::from(price) * u64::from(self.tickets),
            status: BookingStatus::Pending,
            booked_at: now,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Filter for booking listings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingFilter {
    /// Only bookings for this show
    pub show_id: Option<ShowId>,
    /// Only bookings with this contact channel
    pub contact_type: Option<ContactType>,
    /// Only bookings in this state
    pub status: Option<BookingStatus>,
    /// Booked at or after
    pub date_from: Option<DateTime<Utc>>,
    /// Booked at or before
    pub date_to: Option<DateTime<Utc>>,
    /// Page size (defaults to 20, capped at 100)
    pub limit: Option<u32>,
    /// Rows to skip
    pub offset: Option<u32>,
}

impl BookingFilter {
    /// Effective page size.
    #[must_use]
    pub fn limit(&self) -> u32 {
        match self.limit {
            None | Some(0) => DEFAULT_BOOKING_LIMIT,
            Some(limit) => limit.min(MAX_BOOKING_LIMIT),
        }
    }

    /// Effective offset.
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    /// Whether `booking` passes every predicate (ignores paging).
    #[must_use]
    pub fn matches(&self, booking: &Booking) -> bool {
        self.show_id.is_none_or(|id| booking.show_id == id)
            && self.contact_type.is_none_or(|t| booking.contact_type == t)
            && self.status.is_none_or(|s| booking.status == s)
            && self.date_from.is_none_or(|from| booking.booked_at >= from)
            && self.date_to.is_none_or(|to| booking.booked_at <= to)
    }
}

/// Number of bookings per lifecycle state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    /// Pending bookings
    pub pending: u64,
    /// Confirmed bookings
    pub confirmed: u64,
    /// Cancelled bookings
    pub cancelled: u64,
}

impl StatusCounts {
    /// Count one booking in `status`.
    pub const fn record(&mut self, status: BookingStatus) {
        match status {
            BookingStatus::Pending => self.pending += 1,
            BookingStatus::Confirmed => self.confirmed += 1,
            BookingStatus::Cancelled => self.cancelled += 1,
        }
    }
}

/// Booking count for one show.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowBookingCount {
    /// Show
    pub show_id: ShowId,
    /// Bookings placed
    pub bookings: u64,
}

/// Global booking aggregates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingStats {
    /// Bookings of any status
    pub total_bookings: u64,
    /// Seats across all bookings
    pub total_tickets: u64,
    /// Amount across all bookings
    pub total_revenue: u64,
    /// Breakdown by state
    pub by_status: StatusCounts,
    /// Ten shows with the most bookings
    pub top_shows: Vec<ShowBookingCount>,
    /// Ten most recent bookings
    pub recent: Vec<Booking>,
}

/// Per-show booking summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowBookingSummary {
    /// Show
    pub show_id: ShowId,
    /// Show name
    pub show_name: String,
    /// Show location
    pub location: String,
    /// Seats on sale
    pub total_tickets: u32,
    /// Seats held by pending or confirmed bookings
    pub tickets_sold: u64,
    /// `total - sold`, floored at zero
    pub tickets_available: u64,
    /// Bookings of any status
    pub total_bookings: u64,
    /// Amount over pending and confirmed bookings
    pub total_revenue: u64,
    /// Breakdown by state
    pub by_status: StatusCounts,
    /// Five most recent bookings
    pub recent: Vec<Booking>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn request() -> NewBooking {
        NewBooking {
            show_id: ShowId::new(),
            contact_type: ContactType::Email,
            contact_value: "ada@example.com".to_string(),
            tickets: 3,
            customer_name: Some("Ada".to_string()),
        }
    }

    #[test]
    fn booking_id_is_prefixed_hex() {
        let booking = request().into_booking(100, Utc::now());
        let id = booking.id.as_str();

        assert_eq!(id.len(), 19);
        assert!(id.starts_with("BK-"));
        assert!(id[3..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn booking_id_is_deterministic() {
        let req = request();
        let now = Utc::now();
        let a = BookingId::derive(req.show_id, req.contact_type, &req.contact_value, now, 3);
        let b = BookingId::derive(req.show_id, req.contact_type, &req.contact_value, now, 3);
        let c = BookingId::derive(req.show_id, req.contact_type, &req.contact_value, now, 4);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn amount_is_price_times_tickets() {
        let booking = request().into_booking(2_500, Utc::now());
        assert_eq!(booking.total_amount, 7_500);
        assert_eq!(booking.status, BookingStatus::Pending);
    }

    #[test]
    fn zero_tickets_rejected() {
        let mut req = request();
        req.tickets = 0;
        assert!(req.validate().is_err());
    }

    #[test]
    fn contact_validation() {
        assert!(ContactType::Mobile.accepts("+14155550123"));
        assert!(!ContactType::Mobile.accepts("12345"));
        assert!(ContactType::Email.accepts("a@b.co"));
        assert!(!ContactType::Email.accepts("nobody"));
    }

    #[test]
    fn filter_limit_defaults_and_caps() {
        assert_eq!(BookingFilter::default().limit(), 20);
        let filter = BookingFilter {
            limit: Some(500),
            ..BookingFilter::default()
        };
        assert_eq!(filter.limit(), 100);
    }

    #[test]
    fn status_parsing() {
        assert_eq!("confirmed".parse::<BookingStatus>().unwrap(), BookingStatus::Confirmed);
        assert!("shipped".parse::<BookingStatus>().is_err());
        assert!(!BookingStatus::Cancelled.is_active());
    }
}
