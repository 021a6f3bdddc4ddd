//! Maps `EngineError` onto HTTP responses. One place does this mapping,
//! turning a domain error into a wire response instead of scattering
//! `match`es across every handler.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use labtasker_core::EngineError;
use serde::Serialize;

pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.category() {
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "ALREADY_EXISTS" => StatusCode::CONFLICT,
            "INVALID_ARGUMENT" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "WORKER_INACTIVE" | "NOT_OWNED" | "CONFLICT" => StatusCode::CONFLICT,
            "TRANSIENT" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.0.category(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
