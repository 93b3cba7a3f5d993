//! Router configuration for the theater backend.

use super::health::readiness_check;
use super::state::AppState;
use crate::api::{bookings, shows};
use axum::{
    Router,
    routing::{get, post, put},
};
use theater_web::handlers::health_check;
use theater_web::request_id_layer;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the complete Axum router.
///
/// Health probes live at the root, everything else under `/api`. Static
/// segments (`search`, `stats`, ...) win over the `:id` captures.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Shows
        .route("/shows", post(shows::create_show))
        .route("/shows/search", get(shows::search_shows))
        .route("/shows/location/:location", get(shows::shows_by_location))
        .route("/shows/price", get(shows::shows_by_price_range))
        .route("/shows/statistics", get(shows::search_statistics))
        .route("/shows/reindex", post(shows::reindex))
        .route(
            "/shows/:id",
            get(shows::get_show)
                .put(shows::update_show)
                .delete(shows::delete_show),
        )
        .route("/shows/:id/availability", put(shows::update_availability))
        .route("/shows/:id/bookings", get(shows::show_bookings))
        .route("/shows/:id/summary", get(shows::show_summary))
        .route("/shows/:id/capacity", get(shows::check_capacity))
        // Bookings
        .route(
            "/bookings",
            post(bookings::create_booking).get(bookings::list_bookings),
        )
        .route("/bookings/stats", get(bookings::booking_stats))
        .route("/bookings/contact", get(bookings::bookings_by_contact))
        .route(
            "/bookings/:id",
            get(bookings::get_booking).delete(bookings::delete_booking),
        )
        .route("/bookings/:id/status", put(bookings::update_status))
        .route("/bookings/:id/confirm", post(bookings::confirm_booking))
        .route("/bookings/:id/cancel", post(bookings::cancel_booking));

    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(request_id_layer())
        .with_state(state)
}
