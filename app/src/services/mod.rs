//! Show and booking services.
//!
//! Handlers call these; they own the write ordering between the primary
//! store, the record cache and the index.

pub mod bookings;
pub mod shows;

pub use bookings::BookingService;
pub use shows::{ReindexReport, ShowService};
