//! Caller-visible error taxonomy.
//!
//! Index store failures never appear here: they are absorbed by the search
//! executor (fallback) and the index maintainer (logged no-op).

use crate::store::StoreError;

/// Errors surfaced by the show and booking services.
#[derive(Debug, thiserror::Error)]
pub enum TheaterError {
    /// Malformed or out-of-range input, rejected before any store access
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity absent from the primary record store
    #[error("{entity} with id {id} not found")]
    NotFound {
        /// Entity kind ("show", "booking")
        entity: &'static str,
        /// Requested identifier
        id: String,
    },

    /// Requested tickets exceed what is left
    #[error("Requested {requested} tickets but only {available} available")]
    CapacityExceeded {
        /// Tickets asked for
        requested: u32,
        /// Tickets left at the time of the check
        available: u32,
    },

    /// Operation conflicts with the current record state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Primary record store failure
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for TheaterError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::CapacityExceeded {
                requested,
                available,
            } => Self::CapacityExceeded {
                requested,
                available,
            },
            StoreError::Conflict(message) => Self::Conflict(message),
            other => Self::Store(other),
        }
    }
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, TheaterError>;
