//! Axum plumbing for the theater booking backend.
//!
//! Handlers in the `theater` crate return `Result<ApiResponse<T>, AppError>`:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Axum handler                    │  ← extract path/query/JSON
//! ├─────────────────────────────────────────┤
//! │         ShowService / BookingService    │  ← Result<T, TheaterError>
//! ├─────────────────────────────────────────┤
//! │  Ok(T)   → ApiResponse::Success / Paginated
//! │  Err(e)  → AppError → ApiResponse::Error + status
//! └─────────────────────────────────────────┘
//! ```
//!
//! | `TheaterError`       | HTTP |
//! |----------------------|------|
//! | `Validation`         | 422  |
//! | `NotFound`           | 404  |
//! | `CapacityExceeded`   | 409  |
//! | `Conflict`           | 409  |
//! | `Store`              | 500  |

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;

pub use error::AppError;
pub use middleware::{REQUEST_ID_HEADER, RequestId, request_id_layer};
pub use response::{ApiResponse, Pagination};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<ApiResponse<T>, AppError>;
