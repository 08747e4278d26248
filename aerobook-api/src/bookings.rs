use aerobook_core::BookRequest;
use aerobook_shared::{Masked, NewPassenger};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Booking form payload. Browser forms send ids and seats as strings, so
/// numeric fields accept either form.
#[derive(Debug, Deserialize)]
pub struct BookPayload {
    #[serde(default, deserialize_with = "lenient_int")]
    pub flight_id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub passport: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub seat_no: Option<i64>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BookResponse {
    pub status: &'static str,
    pub booking_id: i64,
    pub seat_no: i32,
}

#[derive(Debug, Deserialize)]
pub struct CancelPayload {
    #[serde(default, deserialize_with = "lenient_int")]
    pub booking_id: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub status: &'static str,
    pub refund: f64,
}

/// Integers, integral floats, numeric strings, or nothing. A fractional number
/// is an error; any other non-numeric value reads as absent.
fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Some(i),
            None => Some(n.as_f64().and_then(integral).ok_or_else(|| {
                de::Error::custom(format!("expected a whole number, got {}", n))
            })?),
        },
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    })
}

fn integral(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
}

fn non_blank(field: Option<String>) -> Option<String> {
    field.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl BookPayload {
    fn into_request(self) -> Result<BookRequest, AppError> {
        let (Some(flight_id), Some(name)) = (self.flight_id, non_blank(self.name)) else {
            return Err(AppError::ValidationError("missing fields".to_string()));
        };

        let passenger = NewPassenger {
            name,
            email: non_blank(self.email).map(Masked),
            phone: non_blank(self.phone).map(Masked),
            passport: non_blank(self.passport).map(Masked),
        };

        Ok(BookRequest {
            flight_id,
            passenger,
            // A seat outside i32 can never be valid; treat it as no preference.
            seat_preference: self.seat_no.and_then(|s| i32::try_from(s).ok()),
            payment_method: non_blank(self.payment_method),
        })
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/book", post(book))
        .route("/api/cancel", post(cancel))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/book
async fn book(
    State(state): State<AppState>,
    payload: Result<Json<BookPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<BookResponse>), AppError> {
    let Json(payload) = payload?;
    let request = payload.into_request()?;

    let receipt = state.ledger.book(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(BookResponse {
            status: "ok",
            booking_id: receipt.booking_id,
            seat_no: receipt.seat_no,
        }),
    ))
}

/// POST /api/cancel
async fn cancel(
    State(state): State<AppState>,
    payload: Result<Json<CancelPayload>, JsonRejection>,
) -> Result<Json<CancelResponse>, AppError> {
    let Json(payload) = payload?;
    let booking_id = payload
        .booking_id
        .ok_or_else(|| AppError::ValidationError("missing booking_id".to_string()))?;

    let receipt = state.ledger.cancel(booking_id, payload.reason.as_deref()).await?;

    Ok(Json(CancelResponse {
        status: "ok",
        refund: receipt.refund_amount,
    }))
}
