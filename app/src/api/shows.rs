//! Show API endpoints.
//!
//! - POST   /api/shows                      - Create a show
//! - GET    /api/shows/search               - Paginated search
//! - GET    /api/shows/location/:location   - Shows at a location
//! - GET    /api/shows/price                - Shows in a price range
//! - GET    /api/shows/statistics           - Index coverage
//! - POST   /api/shows/reindex              - Rebuild the index from the primary store
//! - GET    /api/shows/:id                  - Show details
//! - PUT    /api/shows/:id                  - Partial update
//! - DELETE /api/shows/:id                  - Delete a show and its bookings
//! - PUT    /api/shows/:id/availability     - Overwrite the booked count
//! - GET    /api/shows/:id/bookings         - Bookings for a show
//! - GET    /api/shows/:id/summary          - Sales overview
//! - GET    /api/shows/:id/capacity         - Check whether seats are available

use crate::server::state::AppState;
use crate::services::ReindexReport;
use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use theater_core::booking::{Booking, ShowBookingSummary};
use theater_core::search::{SearchCriteria, SearchStatistics};
use theater_core::show::{NewShow, ShowId, ShowPatch, ShowRecord, ShowView};
use theater_web::{ApiResponse, AppError, WebResult};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing shows at a location.
#[derive(Debug, Default, Deserialize)]
pub struct LocationQuery {
    /// Skip sold-out shows
    #[serde(default)]
    pub only_available: bool,
}

/// Query parameters for a price range listing.
#[derive(Debug, Deserialize)]
pub struct PriceQuery {
    /// Inclusive lower bound
    pub min_price: u32,
    /// Inclusive upper bound
    pub max_price: u32,
    /// Optional location filter
    pub location: Option<String>,
}

/// Request to overwrite the booked ticket count.
#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    /// New booked count
    pub booked_tickets: u32,
}

/// Query parameters for a capacity check.
#[derive(Debug, Deserialize)]
pub struct CapacityQuery {
    /// Seats wanted
    pub tickets: u32,
}

/// Capacity check result.
#[derive(Debug, Serialize, Deserialize)]
pub struct CapacityResponse {
    /// Show checked
    pub show_id: ShowId,
    /// Seats asked for
    pub tickets: u32,
    /// Always `true`; a shortfall is reported as a 409
    pub available: bool,
}

/// Acknowledgement of a deletion.
#[derive(Debug, Serialize, Deserialize)]
pub struct Deleted {
    /// Deleted identifier
    pub id: String,
}

pub(crate) fn parse_show_id(raw: &str) -> Result<ShowId, AppError> {
    Ok(raw.parse::<ShowId>()?)
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a show.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/shows \
///   -H "Content-Type: application/json" \
///   -d '{"name":"Swan Lake","details":"Ballet in four acts","price":120,"total_tickets":300,"location":"Downtown"}'
/// ```
pub async fn create_show(
    State(state): State<AppState>,
    payload: Result<Json<NewShow>, JsonRejection>,
) -> Result<(StatusCode, ApiResponse<ShowRecord>), AppError> {
    let Json(request) = payload?;
    let show = state.shows.create_show(request).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message(show, "Show created successfully"),
    ))
}

/// Show details.
pub async fn get_show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> WebResult<ShowRecord> {
    let id = parse_show_id(&id)?;
    Ok(ApiResponse::success(state.shows.get_show(&id).await?))
}

/// Partial update; omitted fields keep their value.
pub async fn update_show(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ShowPatch>, JsonRejection>,
) -> WebResult<ShowRecord> {
    let id = parse_show_id(&id)?;
    let Json(patch) = payload?;
    let show = state.shows.update_show(&id, patch).await?;
    Ok(ApiResponse::with_message(show, "Show updated successfully"))
}

/// Delete a show and its bookings.
pub async fn delete_show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> WebResult<Deleted> {
    let show_id = parse_show_id(&id)?;
    state.shows.delete_show(&show_id).await?;
    Ok(ApiResponse::with_message(Deleted { id }, "Show deleted successfully"))
}

/// Overwrite the booked ticket count.
pub async fn update_availability(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<AvailabilityRequest>, JsonRejection>,
) -> WebResult<ShowRecord> {
    let id = parse_show_id(&id)?;
    let Json(request) = payload?;
    let show = state
        .shows
        .update_ticket_availability(&id, request.booked_tickets)
        .await?;
    Ok(ApiResponse::with_message(show, "Ticket availability updated"))
}

/// Paginated search.
///
/// ```bash
/// curl "http://localhost:8080/api/shows/search?location=Downtown&term=opera&max_price=150&page=1&page_size=20"
/// ```
pub async fn search_shows(
    State(state): State<AppState>,
    query: Result<Query<SearchCriteria>, QueryRejection>,
) -> WebResult<ShowView> {
    let Query(criteria) = query?;
    Ok(state.shows.search_shows(criteria).await?.into())
}

/// Shows at a location.
pub async fn shows_by_location(
    State(state): State<AppState>,
    Path(location): Path<String>,
    query: Result<Query<LocationQuery>, QueryRejection>,
) -> WebResult<Vec<ShowView>> {
    let Query(query) = query?;
    let shows = state
        .shows
        .get_shows_by_location(&location, query.only_available)
        .await?;
    Ok(ApiResponse::success(shows))
}

/// Shows priced within a range, cheapest first.
///
/// ```bash
/// curl "http://localhost:8080/api/shows/price?min_price=50&max_price=150&location=Downtown"
/// ```
pub async fn shows_by_price_range(
    State(state): State<AppState>,
    query: Result<Query<PriceQuery>, QueryRejection>,
) -> WebResult<Vec<ShowView>> {
    let Query(query) = query?;
    let shows = state
        .shows
        .get_shows_by_price_range(query.min_price, query.max_price, query.location.as_deref())
        .await?;
    Ok(ApiResponse::success(shows))
}

/// Index coverage statistics.
pub async fn search_statistics(State(state): State<AppState>) -> WebResult<SearchStatistics> {
    Ok(ApiResponse::success(
        state.shows.get_search_statistics().await?,
    ))
}

/// Rebuild the index from the primary store.
pub async fn reindex(State(state): State<AppState>) -> WebResult<ReindexReport> {
    let report = state.shows.reindex_all().await?;
    Ok(ApiResponse::with_message(report, "Reindex complete"))
}

/// Bookings for a show, newest first.
pub async fn show_bookings(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> WebResult<Vec<Booking>> {
    let id = parse_show_id(&id)?;
    Ok(ApiResponse::success(
        state.bookings.bookings_by_show(&id).await?,
    ))
}

/// Sales overview of a show.
pub async fn show_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> WebResult<ShowBookingSummary> {
    let id = parse_show_id(&id)?;
    Ok(ApiResponse::success(
        state.bookings.show_booking_summary(&id).await?,
    ))
}

/// Whether `tickets` seats are available right now.
pub async fn check_capacity(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<CapacityQuery>, QueryRejection>,
) -> WebResult<CapacityResponse> {
    let show_id = parse_show_id(&id)?;
    let Query(query) = query?;
    state
        .bookings
        .validate_capacity(&show_id, query.tickets)
        .await?;
    Ok(ApiResponse::success(CapacityResponse {
        show_id,
        tickets: query.tickets,
        available: true,
    }))
}
