use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;

use common::events::DomainEvent;

use crate::error::AppError;
use crate::response;
use crate::state::AppState;

/// Development endpoint that exercises the room event plumbing without a
/// real submission: enqueues a `CompilationTest` event, which the manager
/// broadcasts as a COMPILATION_TEST frame.
pub async fn isolate_test(
    State(state): State<AppState>,
    Path(room_id): Path<i64>,
) -> Result<Response, AppError> {
    let manager = state
        .rooms
        .get_by_id(room_id)
        .ok_or(AppError::NotFound("room"))?;

    manager.try_enqueue(DomainEvent::CompilationTest);

    Ok(response::ok_empty(
        StatusCode::OK,
        "get isolate test successfully",
    ))
}
