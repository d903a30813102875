//! Translates `CoordinatorError` into an HTTP response (spec.md §7).
//!
//! Wrapped in a newtype rather than implementing `IntoResponse` directly on
//! `CoordinatorError` since neither the trait nor the error type live in
//! this crate.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use skyclaw_core::CoordinatorError;

pub struct ApiError(pub CoordinatorError);

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            CoordinatorError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
            CoordinatorError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
            CoordinatorError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            CoordinatorError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            CoordinatorError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            CoordinatorError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
            CoordinatorError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
