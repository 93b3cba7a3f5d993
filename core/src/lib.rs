//! # Theater Core
//!
//! Domain types and store boundaries for the theater booking backend.
//!
//! This crate has no I/O of its own. It defines what a show and a booking
//! look like, how search criteria are validated and paginated, how free text
//! is tokenized for the term index, and the traits that the durable record
//! store and the key-value index store implement.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────┐        ┌──────────────────────┐
//! │  Primary Record Store│        │     Index Store      │
//! │  (RecordStore,       │        │  (IndexStore: sets,  │
//! │   ShowStore,         │        │   sorted sets,       │
//! │   BookingStore)      │        │   snapshots, batch)  │
//! └──────────▲───────────┘        └──────────▲───────────┘
//!            │  source of truth              │  derived, lossy
//!            └───────────┬───────────────────┘
//!                        │
//!              theater-projections
//!      (ShowIndexer, SearchExecutor, CachedRepository)
//! ```
//!
//! ## Modules
//!
//! - [`show`]: show records, the flattened [`show::ShowView`] snapshot
//! - [`booking`]: bookings, filters and aggregates
//! - [`search`]: [`search::SearchCriteria`], [`search::SearchResult`], statistics
//! - [`tokenizer`]: term extraction shared by indexing and querying
//! - [`index`]: the [`index::IndexStore`] boundary and its key layout
//! - [`store`]: the primary record store boundary
//! - [`error`]: the caller-visible error taxonomy

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod booking;
pub mod error;
pub mod index;
pub mod search;
pub mod show;
pub mod store;
pub mod tokenizer;

pub use error::TheaterError;

/// Environment module - injected dependencies
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
