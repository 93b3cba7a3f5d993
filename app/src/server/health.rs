//! Dependency probes behind `GET /health/ready`.
//!
//! The primary store is required: when it fails the service reports
//! unhealthy. The index store only degrades the service, since searches fall
//! back to the primary store.

use super::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use sqlx::PgPool;
use std::future::Future;
use std::pin::Pin;
use theater_redis::RedisIndexStore;
use theater_web::handlers::{HealthCheck, HealthReport, readiness};

/// Boxed probe future.
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = HealthCheck> + Send + 'a>>;

/// A dependency that can report its health.
pub trait DependencyProbe: Send + Sync {
    /// Run the check.
    fn check(&self) -> ProbeFuture<'_>;
}

/// Round-trips `SELECT 1` on the primary store.
pub struct PostgresProbe(pub PgPool);

impl DependencyProbe for PostgresProbe {
    fn check(&self) -> ProbeFuture<'_> {
        Box::pin(async move {
            match sqlx::query("SELECT 1").execute(&self.0).await {
                Ok(_) => HealthCheck::healthy("postgres"),
                Err(e) => HealthCheck::unhealthy("postgres", e.to_string()),
            }
        })
    }
}

/// `PING`s the index store.
pub struct RedisProbe(pub RedisIndexStore);

impl DependencyProbe for RedisProbe {
    fn check(&self) -> ProbeFuture<'_> {
        Box::pin(async move {
            match self.0.ping().await {
                Ok(()) => HealthCheck::healthy("redis"),
                Err(e) => HealthCheck::degraded("redis", format!("{e}; searches use the primary store")),
            }
        })
    }
}

/// Readiness endpoint.
///
/// ```bash
/// curl http://localhost:8080/health/ready
/// # {"status":"healthy","checks":[{"component":"postgres","status":"healthy"}, ...]}
/// ```
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let mut checks = Vec::with_capacity(state.probes.len());
    for probe in state.probes.iter() {
        checks.push(probe.check().await);
    }
    readiness(checks)
}
