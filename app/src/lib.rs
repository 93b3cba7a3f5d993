//! Theater show catalogue and booking service.
//!
//! ```text
//! HTTP (axum) ─▶ ShowService / BookingService
//!                   │                  │
//!                   ▼                  ▼
//!          CachedRepository ──▶ PostgreSQL (primary record store)
//!                   │
//!                   ├──▶ Redis record cache
//!          ShowIndexer ──▶ Redis secondary index
//!          SearchExecutor ─▶ index fast path, primary store fallback
//! ```
//!
//! The primary store is the source of truth. The cache and the index are
//! derived and written best-effort; a failed projection never fails a write.

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod metrics;
pub mod server;
pub mod services;

pub use bootstrap::{BootstrapError, Resources, Services, Stores, build_services};
pub use config::Config;
pub use server::{AppState, build_router};
pub use services::{BookingService, ReindexReport, ShowService};
