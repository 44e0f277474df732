//! JSON envelope shared by every non-SSE endpoint:
//! `{error: bool, data: any, message: string}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub error: bool,
    pub data: Option<T>,
    pub message: String,
}

pub fn json<T: Serialize>(
    status: StatusCode,
    data: Option<T>,
    error: bool,
    message: impl Into<String>,
) -> Response {
    (
        status,
        Json(Envelope {
            error,
            data,
            message: message.into(),
        }),
    )
        .into_response()
}

/// Success envelope.
pub fn ok<T: Serialize>(status: StatusCode, data: T, message: impl Into<String>) -> Response {
    json(status, Some(data), false, message)
}

/// Success envelope with no payload.
pub fn ok_empty(status: StatusCode, message: impl Into<String>) -> Response {
    json::<()>(status, None, false, message)
}

/// Error envelope.
pub fn fail(status: StatusCode, message: impl Into<String>) -> Response {
    json::<()>(status, None, true, message)
}
