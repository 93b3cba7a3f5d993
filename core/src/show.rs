//! Show records and their flattened index view.
//!
//! A [`ShowRecord`] is owned by the primary record store. The index store only
//! ever sees a [`ShowView`], a lossy flattened copy used for fast hydration.

use crate::error::TheaterError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a show
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShowId(Uuid);

impl ShowId {
    /// Creates a new random `ShowId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ShowId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ShowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ShowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ShowId {
    type Err = TheaterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| TheaterError::Validation(format!("invalid show id: {s}")))
    }
}

// ============================================================================
// Records
// ============================================================================

/// A show as stored in the primary record store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowRecord {
    /// Show identifier (immutable)
    pub id: ShowId,
    /// Display name
    pub name: String,
    /// Free-text description
    pub details: String,
    /// Ticket price in the smallest currency unit
    pub price: u32,
    /// Total seats on sale
    pub total_tickets: u32,
    /// Seats already booked (`0 <= booked_tickets <= total_tickets`)
    pub booked_tickets: u32,
    /// Venue location, matched case-insensitively
    pub location: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl ShowRecord {
    /// Seats still on sale.
    #[must_use]
    pub const fn available_tickets(&self) -> u32 {
        self.total_tickets.saturating_sub(self.booked_tickets)
    }

    /// Whether any seat is still on sale.
    #[must_use]
    pub const fn has_availability(&self) -> bool {
        self.booked_tickets < self.total_tickets
    }

    /// The flattened snapshot stored in the index.
    #[must_use]
    pub fn view(&self) -> ShowView {
        ShowView::from(self)
    }

    /// Check the booked/total invariant.
    ///
    /// # Errors
    ///
    /// Returns [`TheaterError::Validation`] when more tickets are booked than exist.
    pub fn check_counts(&self) -> Result<(), TheaterError> {
        if self.booked_tickets > self.total_tickets {
            return Err(TheaterError::Validation(format!(
                "booked tickets ({}) cannot exceed total tickets ({})",
                self.booked_tickets, self.total_tickets
            )));
        }
        Ok(())
    }
}

/// Flattened, denormalized show snapshot.
///
/// Stored under `show:{id}` in the index store and returned by every search,
/// whichever path answered it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowView {
    /// Show identifier
    pub id: ShowId,
    /// Display name
    pub name: String,
    /// Venue location as entered
    pub location: String,
    /// Ticket price
    pub price: u32,
    /// `total - booked`; search results carry the index's live availability
    pub available_tickets: u32,
    /// Total seats
    pub total_tickets: u32,
    /// Free-text description
    pub details: String,
}

impl From<&ShowRecord> for ShowView {
    fn from(record: &ShowRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            location: record.location.clone(),
            price: record.price,
            available_tickets: record.available_tickets(),
            total_tickets: record.total_tickets,
            details: record.details.clone(),
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Attributes for a new show.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewShow {
    /// Display name
    pub name: String,
    /// Free-text description
    #[serde(default)]
    pub details: String,
    /// Ticket price
    pub price: u32,
    /// Total seats on sale
    pub total_tickets: u32,
    /// Venue location
    pub location: String,
}

impl NewShow {
    /// Validate and turn the attributes into a fresh record with nothing booked.
    ///
    /// Name and location are trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`TheaterError::Validation`] when the name or location is blank.
    pub fn into_record(self, id: ShowId, now: DateTime<Utc>) -> Result<ShowRecord, TheaterError> {
        let name = required("name", &self.name)?;
        let location = required("location", &self.location)?;

        Ok(ShowRecord {
            id,
            name,
            details: self.details.trim().to_string(),
            price: self.price,
            total_tickets: self.total_tickets,
            booked_tickets: 0,
            location,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update for an existing show. `None` leaves a field untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowPatch {
    /// New display name
    pub name: Option<String>,
    /// New description
    pub details: Option<String>,
    /// New price
    pub price: Option<u32>,
    /// New total seat count
    pub total_tickets: Option<u32>,
    /// New booked seat count
    pub booked_tickets: Option<u32>,
    /// New location
    pub location: Option<String>,
}

impl ShowPatch {
    /// Apply the patch to `record`, bumping `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`TheaterError::Validation`] for blank names or locations and when
    /// the result would book more tickets than exist. `record` is left untouched
    /// on error.
    pub fn apply(self, record: &ShowRecord, now: DateTime<Utc>) -> Result<ShowRecord, TheaterError> {
        let mut next = record.clone();

        if let Some(name) = self.name {
            next.name = required("name", &name)?;
        }
        if let Some(location) = self.location {
            next.location = required("location", &location)?;
        }
        if let Some(details) = self.details {
            next.details = details.trim().to_string();
        }
        if let Some(price) = self.price {
            next.price = price;
        }
        if let Some(total) = self.total_tickets {
            next.total_tickets = total;
        }
        if let Some(booked) = self.booked_tickets {
            next.booked_tickets = booked;
        }

        next.check_counts()?;
        next.updated_at = now;
        Ok(next)
    }
}

fn required(field: &str, value: &str) -> Result<String, TheaterError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TheaterError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}
