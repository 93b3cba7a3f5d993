//! Service metrics.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `theater_search_total{path}` - Show searches by answering path (`index`, `fallback`)
//! - `theater_index_write_failures_total{op}` - Index batches that failed to apply
//! - `theater_cache_total{kind,result}` - Record cache lookups (`hit`, `miss`)
//! - `theater_refresh_dropped_total` - Refresh jobs dropped because the queue was full
//! - `theater_bookings_total{status}` - Booking lifecycle outcomes
//! - `theater_store_errors_total{context}` - Primary store failures

use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Register descriptions for every metric the service records.
///
/// Call once at startup, before any metric is recorded.
pub fn register_metrics() {
    describe_counter!(
        "theater_search_total",
        "Show searches by answering path (index, fallback)"
    );
    describe_counter!(
        "theater_index_write_failures_total",
        "Index batches that failed to apply, by operation"
    );
    describe_counter!(
        "theater_cache_total",
        "Record cache lookups by entity kind and result (hit, miss)"
    );
    describe_counter!(
        "theater_refresh_dropped_total",
        "Background refresh jobs dropped because the queue was full"
    );
    describe_counter!(
        "theater_bookings_total",
        "Booking outcomes (created, rejected, confirmed, cancelled, deleted)"
    );
    describe_counter!(
        "theater_store_errors_total",
        "Primary record store failures by query context"
    );

    tracing::info!("Service metrics registered");
}

/// Start the Prometheus scrape endpoint.
///
/// # Errors
///
/// Returns an error if the address is invalid or the exporter cannot bind.
pub fn install_exporter(addr: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = addr.parse()?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

/// Record a booking lifecycle outcome.
pub fn record_booking(status: &'static str) {
    metrics::counter!("theater_bookings_total", "status" => status).increment(1);
}
