//! Theater booking server.
//!
//! This binary:
//! - Connects to `PostgreSQL` and runs migrations
//! - Connects to Redis (secondary index and record cache)
//! - Starts the background refresh queue
//! - Serves the HTTP API and the Prometheus exporter
//!
//! # Usage
//!
//! ```bash
//! # Start infrastructure
//! docker compose up -d
//!
//! # Run server
//! cargo run --bin server
//! ```

use theater::metrics::{install_exporter, register_metrics};
use theater::server::{DependencyProbe, PostgresProbe, RedisProbe};
use theater::{AppState, Config, Resources, build_router, build_services};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_new(&config.server.log_level)
                .unwrap_or_else(|_| "info,theater=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting theater booking server...");
    tracing::info!(
        postgres = %config.postgres.url,
        redis = %config.redis.url,
        "Configuration loaded"
    );

    register_metrics();
    install_exporter(&config.metrics_addr())?;

    let resources = Resources::from_config(&config).await?;
    let (services, dispatcher) = build_services(
        resources.stores(),
        config.search_config(),
        config.refresh_config(),
    );
    tracing::info!("✓ Services initialized");

    let probes: Vec<Box<dyn DependencyProbe>> = vec![
        Box::new(PostgresProbe(resources.pool.clone())),
        Box::new(RedisProbe(resources.index.clone())),
    ];
    let state = AppState::new(&services).with_probes(probes);
    let app = build_router(state);

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down gracefully...");
    drop(services);
    dispatcher.abort();
    resources.pool.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
