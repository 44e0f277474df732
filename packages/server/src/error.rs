use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use common::repository::RepoError;
use executor::SanitizeError;

use crate::response;

/// Application-level error type. Every variant renders as the standard JSON
/// envelope with `error: true`.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    NotFound(&'static str),
    InvalidPassword,
    Conflict(String),
    Sanitize(SanitizeError),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Validation(message) => response::fail(StatusCode::BAD_REQUEST, message),
            AppError::NotFound(what) => {
                response::fail(StatusCode::NOT_FOUND, format!("{what} not found"))
            }
            AppError::InvalidPassword => {
                response::fail(StatusCode::UNAUTHORIZED, "Invalid password")
            }
            AppError::Conflict(message) => response::fail(StatusCode::CONFLICT, message),
            AppError::Sanitize(err) => {
                // The rejection category rides along in `data` so clients can
                // show what tripped.
                let data = json!({
                    "category": err.category(),
                    "details": err.to_string(),
                });
                response::json(StatusCode::BAD_REQUEST, Some(data), true, err.to_string())
            }
            AppError::Internal(detail) => {
                tracing::error!("internal error: {detail}");
                response::fail(StatusCode::INTERNAL_SERVER_ERROR, "An unexpected error occurred")
            }
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(what) => AppError::NotFound(what),
            RepoError::Conflict(message) => AppError::Conflict(message),
            RepoError::Storage(detail) => AppError::Internal(detail),
        }
    }
}
