//! Maps `EscrowError` onto HTTP status codes for every handler in `http.rs`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use escrow_types::EscrowError;
use serde_json::json;

pub struct ApiError(pub EscrowError);

impl From<EscrowError> for ApiError {
    fn from(err: EscrowError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EscrowError::Validation(_) => StatusCode::BAD_REQUEST,
            EscrowError::Authorization(_) => StatusCode::FORBIDDEN,
            EscrowError::NotFound(_) => StatusCode::NOT_FOUND,
            EscrowError::PreconditionFailed => StatusCode::CONFLICT,
            EscrowError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            EscrowError::Persistent(_) => StatusCode::BAD_GATEWAY,
            EscrowError::Internal(_) | EscrowError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
