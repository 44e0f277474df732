use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;

use crate::error::AppError;
use crate::response;
use crate::state::AppState;

pub async fn list_questions(State(state): State<AppState>) -> Result<Response, AppError> {
    let questions = state.repo.list_questions().await?;
    Ok(response::ok(StatusCode::OK, questions, ""))
}
