//! HTTP server: state, routes and readiness probes.

pub mod health;
pub mod routes;
pub mod state;

pub use health::{DependencyProbe, PostgresProbe, RedisProbe};
pub use routes::build_router;
pub use state::AppState;
