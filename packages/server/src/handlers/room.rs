use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use common::events::DomainEvent;
use common::models::LeaderboardEntry;
use common::repository::CreateRoomParams;

use crate::error::AppError;
use crate::extractors::AppJson;
use crate::response;
use crate::state::AppState;

pub async fn list_rooms(State(state): State<AppState>) -> Result<Response, AppError> {
    let rooms = state.repo.list_rooms().await?;
    Ok(response::ok(StatusCode::OK, rooms, "get rooms successfully"))
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

pub async fn create_room(
    State(state): State<AppState>,
    AppJson(req): AppJson<CreateRoomRequest>,
) -> Result<Response, AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("room name must not be empty".to_string()));
    }

    let room = state
        .repo
        .create_room(CreateRoomParams {
            name: req.name,
            description: req.description,
        })
        .await?;

    // Every live room gets its own manager.
    state.rooms.create(room.id);
    info!(room_id = room.id, "room created");

    Ok(response::ok(
        StatusCode::CREATED,
        room,
        "create room successfully",
    ))
}

pub async fn delete_room(
    State(state): State<AppState>,
    Path(room_id): Path<i64>,
) -> Result<Response, AppError> {
    state.repo.get_room(room_id).await?;

    let manager = state
        .rooms
        .get_by_id(room_id)
        .ok_or(AppError::NotFound("room"))?;

    // The manager's loop deletes the room, broadcasts ROOM_DELETED, and
    // stops once it drains this terminal event.
    if !manager.try_enqueue(DomainEvent::RoomDeleted { room_id }) {
        warn!(room_id, "room inbox full, delete event dropped");
    }
    state.rooms.remove(room_id);

    Ok(response::ok_empty(StatusCode::OK, "delete room successfully"))
}

pub async fn leave_room(
    State(state): State<AppState>,
    Path((room_id, player_id)): Path<(i64, i64)>,
) -> Result<Response, AppError> {
    let manager = state
        .rooms
        .get_by_id(room_id)
        .ok_or(AppError::NotFound("room"))?;

    state.repo.get_player(player_id).await?;

    if !manager.try_enqueue(DomainEvent::PlayerLeft { player_id, room_id }) {
        warn!(room_id, player_id, "room inbox full, leave event dropped");
    }

    Ok(response::ok_empty(StatusCode::OK, "leave room successfully"))
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub entries: Vec<LeaderboardEntry>,
}

pub async fn get_leaderboard(
    State(state): State<AppState>,
    Path(room_id): Path<i64>,
) -> Result<Response, AppError> {
    let entries = state.repo.leaderboard(room_id).await?;
    Ok(response::ok(
        StatusCode::OK,
        LeaderboardResponse { entries },
        "get leaderboard successfully",
    ))
}
