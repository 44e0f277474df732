use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use common::events::{DomainEvent, SolutionSubmitted};
use executor::sanitize;

use crate::error::AppError;
use crate::extractors::AppJson;
use crate::response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitSolutionRequest {
    pub question_id: i64,
    pub room_id: i64,
    pub language: String,
    pub code: String,
    pub player_id: i64,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Accepts a solution for asynchronous judging. The screening step is the
/// only synchronous gate: a rejected submission produces no event and no
/// job. Everything else is acknowledged with 202 immediately.
pub async fn submit_solution(
    State(state): State<AppState>,
    AppJson(req): AppJson<SubmitSolutionRequest>,
) -> Result<Response, AppError> {
    let manager = state
        .rooms
        .get_by_id(req.room_id)
        .ok_or(AppError::NotFound("room"))?;

    sanitize(
        &req.code,
        &req.language,
        state.config.submission.max_code_length,
    )
    .map_err(AppError::Sanitize)?;

    let event = DomainEvent::SolutionSubmitted(SolutionSubmitted {
        player_id: req.player_id,
        room_id: req.room_id,
        question_id: req.question_id,
        code: req.code,
        language: req.language,
        submitted_at: req.submitted_at.unwrap_or_else(Utc::now),
    });

    // The caller already has its 202; a full inbox sheds the event.
    if !manager.try_enqueue(event) {
        warn!(room_id = req.room_id, "room inbox full, submission dropped");
    }

    Ok(response::ok_empty(StatusCode::ACCEPTED, ""))
}
