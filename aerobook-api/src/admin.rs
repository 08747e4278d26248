use aerobook_core::{BookingDetails, FlightReportRow, LedgerTotals};
use aerobook_shared::{Flight, NewFlight};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::error::AppError;
use crate::middleware::auth::admin_auth_middleware;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/flights", post(create_flight))
        .route("/dashboard", get(dashboard))
        .route("/report", get(report))
        .route("/bookings/{id}", get(get_booking))
        .route_layer(axum::middleware::from_fn_with_state(state, admin_auth_middleware))
}

/// POST /api/admin/flights
async fn create_flight(
    State(state): State<AppState>,
    payload: Result<Json<NewFlight>, JsonRejection>,
) -> Result<(StatusCode, Json<Flight>), AppError> {
    let Json(new) = payload?;
    let flight = state.inventory.create_flight(new).await?;
    Ok((StatusCode::CREATED, Json(flight)))
}

/// GET /api/admin/dashboard
/// Booking count and revenue across every flight
async fn dashboard(State(state): State<AppState>) -> Result<Json<LedgerTotals>, AppError> {
    Ok(Json(state.reports.dashboard().await?))
}

/// GET /api/admin/report
async fn report(State(state): State<AppState>) -> Result<Json<Vec<FlightReportRow>>, AppError> {
    Ok(Json(state.reports.flight_report().await?))
}

/// GET /api/admin/bookings/{id}
/// Full booking record, passenger contact details included
async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<i64>,
) -> Result<Json<BookingDetails>, AppError> {
    Ok(Json(state.reports.booking(booking_id).await?))
}
