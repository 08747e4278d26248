use aerobook_shared::Flight;
use axum::{extract::State, routing::get, Json, Router};

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/flights", get(list_flights))
}

/// GET /api/flights
/// All flights, earliest departure first
async fn list_flights(State(state): State<AppState>) -> Result<Json<Vec<Flight>>, AppError> {
    let flights = state.inventory.list_flights().await?;
    Ok(Json(flights))
}
