//! `PostgreSQL` primary record store for the theater booking backend.
//!
//! Implements the [`ShowStore`] and [`BookingStore`] boundaries from
//! `theater-core` with sqlx. Ticket counts are only ever changed by single
//! conditional `UPDATE ... RETURNING` statements, so capacity checks hold under
//! concurrent bookings without application-level locking.
//!
//! # Example
//!
//! ```ignore
//! use theater_postgres::{PoolSettings, PostgresShowStore, connect, migrate};
//!
//! let pool = connect("postgres://localhost/theater", PoolSettings::default()).await?;
//! migrate(&pool).await?;
//! let shows = PostgresShowStore::new(pool.clone());
//! ```
//!
//! [`ShowStore`]: theater_core::store::ShowStore
//! [`BookingStore`]: theater_core::store::BookingStore

mod bookings;
mod shows;

pub use bookings::PostgresBookingStore;
pub use shows::PostgresShowStore;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use theater_core::store::StoreError;

/// Connection pool sizing.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    /// Upper bound on open connections
    pub max_connections: u32,
    /// Connections kept open while idle
    pub min_connections: u32,
    /// How long to wait for a connection
    pub connect_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if the database cannot be reached.
pub async fn connect(database_url: &str, settings: PoolSettings) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.connect_timeout)
        .connect(database_url)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;

    tracing::info!(
        max_connections = settings.max_connections,
        "PostgreSQL pool ready"
    );
    Ok(pool)
}

/// Run the bundled schema migrations.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
    tracing::info!("Database migrations complete");
    Ok(())
}

const UNIQUE_VIOLATION: &str = "23505";
const CHECK_VIOLATION: &str = "23514";

/// Map a driver error, keeping constraint violations distinguishable.
pub(crate) fn db_error(context: &str, e: &sqlx::Error) -> StoreError {
    if let Some(db) = e.as_database_error() {
        match db.code().as_deref() {
            Some(UNIQUE_VIOLATION) => return StoreError::Conflict(format!("{context}: {db}")),
            Some(CHECK_VIOLATION) => {
                return StoreError::Conflict(format!("{context}: constraint {db}"));
            }
            _ => {}
        }
    }
    metrics::counter!("theater_store_errors_total", "context" => context.to_string()).increment(1);
    StoreError::Database(format!("{context}: {e}"))
}

pub(crate) fn to_db(value: u32) -> i64 {
    i64::from(value)
}

pub(crate) fn amount_to_db(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Serialization(format!("amount {value} out of range")))
}

pub(crate) fn from_db<T: TryFrom<i64>>(field: &str, value: i64) -> Result<T, StoreError> {
    T::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("column {field} holds {value}")))
}
