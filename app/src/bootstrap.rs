//! Composition root.
//!
//! Store handles are created once here and handed to the services through
//! their constructors:
//!
//! 1. [`Resources::from_config`] connects `PostgreSQL` (running migrations) and Redis
//! 2. [`Resources::stores`] exposes them behind the `theater-core` traits
//! 3. [`build_services`] wires repositories, indexer, search executor and the
//!    refresh queue into a [`Services`] bundle
//!
//! Tests skip step 1 and pass in-memory stores to [`build_services`].

use crate::config::Config;
use crate::services::{BookingService, ShowService};
use sqlx::PgPool;
use std::sync::Arc;
use theater_core::environment::{Clock, SystemClock};
use theater_core::index::{IndexError, IndexStore};
use theater_core::store::{BookingStore, ShowStore, StoreError};
use theater_postgres::{PostgresBookingStore, PostgresShowStore};
use theater_projections::{
    CachedRepository, RefreshConfig, RefreshQueue, SearchConfig, SearchExecutor, ShowIndexer,
};
use theater_redis::RedisIndexStore;
use tokio::task::JoinHandle;
use tracing::info;

/// Startup failures.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// The primary store could not be reached or migrated
    #[error("primary store: {0}")]
    Store(#[from] StoreError),

    /// The index store could not be reached
    #[error("index store: {0}")]
    Index(#[from] IndexError),
}

/// Store handles behind their trait boundaries.
#[derive(Clone)]
pub struct Stores {
    /// Show table
    pub shows: Arc<dyn ShowStore>,
    /// Booking table
    pub bookings: Arc<dyn BookingStore>,
    /// Index store, also holding the record cache
    pub index: Arc<dyn IndexStore>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

/// Connected infrastructure.
#[derive(Clone)]
pub struct Resources {
    /// `PostgreSQL` pool (primary record store)
    pub pool: PgPool,
    /// Redis index store
    pub index: RedisIndexStore,
}

impl Resources {
    /// Connect to every backing store.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError`] if a store is unreachable or a migration fails.
    pub async fn from_config(config: &Config) -> Result<Self, BootstrapError> {
        info!("Connecting to primary store...");
        let pool = theater_postgres::connect(&config.postgres.url, config.pool_settings()).await?;

        info!("Running migrations...");
        theater_postgres::migrate(&pool).await?;
        info!("Migrations complete");

        info!("Connecting to index store...");
        let index = RedisIndexStore::new(&config.redis.url).await?;

        Ok(Self { pool, index })
    }

    /// Trait-object handles over the connected stores.
    #[must_use]
    pub fn stores(&self) -> Stores {
        Stores {
            shows: Arc::new(PostgresShowStore::new(self.pool.clone())),
            bookings: Arc::new(PostgresBookingStore::new(self.pool.clone())),
            index: Arc::new(self.index.clone()),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Everything the HTTP layer needs.
#[derive(Clone)]
pub struct Services {
    /// Show catalogue
    pub shows: ShowService,
    /// Bookings
    pub bookings: BookingService,
    /// Background refresh queue shared by the search executor
    pub refresh: RefreshQueue,
}

/// Wire the services over `stores`.
///
/// Must run inside a tokio runtime: the refresh dispatcher is spawned here
/// and its handle returned.
#[must_use]
pub fn build_services(
    stores: Stores,
    search: SearchConfig,
    refresh: RefreshConfig,
) -> (Services, JoinHandle<()>) {
    let (queue, dispatcher) = RefreshQueue::spawn(refresh);

    let indexer = ShowIndexer::new(Arc::clone(&stores.index));
    let show_repository: CachedRepository<_, dyn ShowStore> =
        CachedRepository::new(Arc::clone(&stores.shows), Arc::clone(&stores.index));
    let booking_repository: CachedRepository<_, dyn BookingStore> =
        CachedRepository::new(Arc::clone(&stores.bookings), Arc::clone(&stores.index));
    let executor = SearchExecutor::new(
        Arc::clone(&stores.index),
        Arc::clone(&stores.shows),
        queue.clone(),
        search,
    );

    let shows = ShowService::new(
        show_repository.clone(),
        indexer.clone(),
        executor,
        Arc::clone(&stores.clock),
        search.limits.max_page_size,
    );
    let bookings = BookingService::new(booking_repository, show_repository, indexer, stores.clock);

    (
        Services {
            shows,
            bookings,
            refresh: queue,
        },
        dispatcher,
    )
}
