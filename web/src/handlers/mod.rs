//! HTTP request handlers shared by every deployment.

pub mod health;

pub use health::{HealthCheck, HealthReport, HealthStatus, health_check, readiness};
