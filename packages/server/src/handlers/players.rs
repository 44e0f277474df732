use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use serde::Deserialize;
use tracing::info;

use common::repository::CreatePlayerParams;

use crate::error::AppError;
use crate::extractors::AppJson;
use crate::response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreatePlayerRequest {
    pub name: String,
    pub password: String,
}

pub async fn create_player(
    State(state): State<AppState>,
    AppJson(req): AppJson<CreatePlayerRequest>,
) -> Result<Response, AppError> {
    if req.name.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::Validation(
            "name and password must not be empty".to_string(),
        ));
    }

    let player = state
        .repo
        .create_player(CreatePlayerParams {
            name: req.name.trim().to_string(),
            password: req.password,
        })
        .await?;

    info!(player_id = player.id, name = %player.name, "new player created");
    Ok(response::ok(
        StatusCode::CREATED,
        player,
        "Player created successfully",
    ))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub name: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<Response, AppError> {
    let player = state
        .repo
        .get_player_by_name(req.name.trim())
        .await
        .map_err(|_| AppError::NotFound("player"))?;

    if !crate::utils::hash::verify_password(&req.password, &player.password_hash) {
        return Err(AppError::InvalidPassword);
    }

    info!(player_id = player.id, "login successful");
    Ok(response::ok(StatusCode::OK, player, "Login successful"))
}
