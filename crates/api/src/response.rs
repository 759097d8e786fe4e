//! API response types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Standard success envelope, `{ "data": ... }`.
///
/// Errors never travel in this type; they are rendered by `AppError`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Payload
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a success response.
    pub const fn ok(data: T) -> Self {
        Self { data }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Body of operations that only acknowledge.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Ack {
    /// Whether the operation took effect
    pub ok: bool,
}

impl Ack {
    /// Acknowledge.
    #[must_use]
    pub const fn yes() -> ApiResponse<Self> {
        ApiResponse::ok(Self { ok: true })
    }

    /// Acknowledge with an explicit result.
    #[must_use]
    pub const fn of(ok: bool) -> ApiResponse<Self> {
        ApiResponse::ok(Self { ok })
    }
}
