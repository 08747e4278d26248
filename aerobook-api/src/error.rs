use aerobook_core::CoreError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    Core(CoreError),
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        AppError::Core(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

fn core_status(err: &CoreError) -> StatusCode {
    match err {
        CoreError::ValidationError(_) | CoreError::AlreadyCancelled(_) => StatusCode::BAD_REQUEST,
        CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        CoreError::CapacityExceeded { .. } | CoreError::Conflict(_) => StatusCode::CONFLICT,
        CoreError::TransactionFailure(e) if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::TransactionFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::AuthenticationError(msg) => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "AUTHENTICATION_ERROR", "detail": msg }),
            ),
            AppError::AuthorizationError(msg) => (
                StatusCode::FORBIDDEN,
                json!({ "error": "AUTHORIZATION_ERROR", "detail": msg }),
            ),
            AppError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "VALIDATION_ERROR", "detail": msg }),
            ),
            AppError::Core(err) => {
                let status = core_status(&err);
                if status.is_server_error() {
                    tracing::error!("Ledger transaction failed: {}", err);
                } else {
                    tracing::debug!("Request rejected: {}", err);
                }

                let mut body = json!({ "error": err.kind(), "detail": err.to_string() });
                if matches!(err, CoreError::TransactionFailure(_)) {
                    body["retryable"] = json!(err.is_retryable());
                }
                (status, body)
            }
        };

        (status, Json(body)).into_response()
    }
}
