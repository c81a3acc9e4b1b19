//! Small response helpers shared by the HTTP handlers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::json;

/// Wraps `data` as a `200 OK` JSON body.
pub fn api_success<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::OK, Json(data))
}

/// A bare `{"success": true}` acknowledgement.
pub fn api_ok() -> impl IntoResponse {
    api_success(json!({"success": true}))
}

/// An error response with an explicit status, machine-readable code, and message.
pub fn api_error(status: StatusCode, code: &str, message: impl ToString) -> impl IntoResponse {
    (
        status,
        Json(json!({"error": code, "message": message.to_string()})),
    )
}
