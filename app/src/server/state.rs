//! Application state for the HTTP server.

use super::health::DependencyProbe;
use crate::bootstrap::Services;
use crate::services::{BookingService, ShowService};
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    /// Show catalogue
    pub shows: ShowService,

    /// Bookings
    pub bookings: BookingService,

    /// Dependencies checked by the readiness endpoint
    pub probes: Arc<Vec<Box<dyn DependencyProbe>>>,
}

impl AppState {
    /// State with no readiness probes.
    #[must_use]
    pub fn new(services: &Services) -> Self {
        Self {
            shows: services.shows.clone(),
            bookings: services.bookings.clone(),
            probes: Arc::new(Vec::new()),
        }
    }

    /// Replace the readiness probes.
    #[must_use]
    pub fn with_probes(mut self, probes: Vec<Box<dyn DependencyProbe>>) -> Self {
        self.probes = Arc::new(probes);
        self
    }
}
