//! Read-side machinery for the theater booking backend.
//!
//! # Overview
//!
//! Everything here sits between the services and two stores:
//!
//! - **Primary record store** (`PostgreSQL` in production): the authority for
//!   shows and bookings.
//! - **Index store** (`Redis` in production): a derived, disposable projection
//!   of shows plus a record cache.
//!
//! ```text
//!            writes                       reads
//! ShowService ──▶ CachedRepository ──▶ primary store
//!      │                  └────────▶ record cache (cache:{kind}:{id})
//!      └──▶ ShowIndexer ──────────▶ index store ◀── SearchExecutor ──fallback──▶ primary store
//!                                                        │
//!                                                        └──▶ RefreshQueue ──▶ ShowIndexer
//! ```
//!
//! The index is never authoritative. Every component here tolerates an
//! unreachable or partially flushed index: writers log and carry on, readers
//! fall back to the primary store and schedule a re-projection.

pub mod indexer;
pub mod refresh;
pub mod repository;
pub mod search;

pub use indexer::ShowIndexer;
pub use refresh::{RefreshConfig, RefreshQueue};
pub use repository::{CacheOutcome, CachedRepository, Lookup};
pub use search::{SearchConfig, SearchExecutor, SearchPath, UnfilteredStrategy, intersect_all};
