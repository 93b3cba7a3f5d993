//! # Theater Testing
//!
//! Testing utilities for the theater booking backend.
//!
//! This crate provides:
//! - In-memory implementations of the index store and both record stores
//! - [`FlakyIndexStore`] to exercise fallback and best-effort paths
//! - A fixed clock and show/booking fixtures
//! - proptest strategies for domain types
//!
//! ## Example
//!
//! ```ignore
//! use theater_testing::{InMemoryIndexStore, InMemoryShowStore, fixtures};
//!
//! #[tokio::test]
//! async fn test_location_search() {
//!     let index = Arc::new(InMemoryIndexStore::new());
//!     let shows = Arc::new(InMemoryShowStore::new());
//!     let indexer = ShowIndexer::new(index.clone());
//!
//!     let show = fixtures::show("Swan Lake", "Downtown", 100, 50);
//!     indexer.index_show(&show).await;
//!
//!     assert!(index.contains_key("shows:location:downtown"));
//! }
//! ```

use chrono::{DateTime, Utc};
use theater_core::environment::Clock;

pub mod fixtures;
pub mod index_mocks;
pub mod store_mocks;

/// Mock implementations of Environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use theater_testing::mocks::FixedClock;
    /// use theater_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use theater_core::show::NewShow;

    /// Locations drawn from a small pool so that generated shows collide.
    pub fn location() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["Downtown", "downtown", "Uptown", "Harbor", "Old Town"])
            .prop_map(str::to_string)
    }

    /// Arbitrary valid show attributes.
    pub fn new_show() -> impl Strategy<Value = NewShow> {
        (
            "[A-Z][a-z]{2,8}( [A-Z][a-z]{2,8}){0,2}",
            "[a-z]{1,8}( [a-z]{1,8}){0,5}",
            0u32..500,
            0u32..200,
            location(),
        )
            .prop_map(|(name, details, price, total_tickets, location)| NewShow {
                name,
                details,
                price,
                total_tickets,
                location,
            })
    }
}

/// Install a test tracing subscriber honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use index_mocks::{FlakyIndexStore, InMemoryIndexStore};
pub use mocks::{FixedClock, test_clock};
pub use store_mocks::{InMemoryBookingStore, InMemoryShowStore};
