//! HTTP handlers.
//!
//! Handlers are thin: extract, call a service, wrap the result in an
//! [`ApiResponse`](theater_web::ApiResponse). Rejected extractors and service
//! errors both become an [`AppError`](theater_web::AppError).

pub mod bookings;
pub mod shows;
