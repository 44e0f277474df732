//! Persistence contract consumed by the room engine and the judgement job.
//!
//! Implementations are internally synchronized; callers never coordinate
//! access themselves. After `update_room_player_ranks` returns, places within
//! the room form a permutation of 1..=N consistent with descending score
//! order (ties keep their previous relative order).

use async_trait::async_trait;
use thiserror::Error;

use crate::language::Language;
use crate::models::{LeaderboardEntry, Player, Question, Room, RoomMembership, Submission};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Clone, Debug)]
pub struct CreatePlayerParams {
    pub name: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct CreateRoomParams {
    pub name: String,
    pub description: String,
}

#[derive(Clone, Debug)]
pub struct CreateRoomPlayerParams {
    pub room_id: i64,
    pub player_id: i64,
    pub score: u32,
    pub place: u32,
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_player(&self, id: i64) -> RepoResult<Player>;
    async fn get_player_by_name(&self, name: &str) -> RepoResult<Player>;
    async fn create_player(&self, params: CreatePlayerParams) -> RepoResult<Player>;

    async fn get_room(&self, id: i64) -> RepoResult<Room>;
    async fn list_rooms(&self) -> RepoResult<Vec<Room>>;
    async fn create_room(&self, params: CreateRoomParams) -> RepoResult<Room>;
    async fn delete_room(&self, id: i64) -> RepoResult<()>;

    async fn get_room_player(&self, room_id: i64, player_id: i64) -> RepoResult<RoomMembership>;
    async fn create_room_player(
        &self,
        params: CreateRoomPlayerParams,
    ) -> RepoResult<RoomMembership>;
    async fn delete_room_player(&self, room_id: i64, player_id: i64) -> RepoResult<()>;
    async fn update_room_player_ranks(&self, room_id: i64) -> RepoResult<()>;
    async fn add_room_player_score(
        &self,
        room_id: i64,
        player_id: i64,
        delta: u32,
    ) -> RepoResult<()>;
    async fn leaderboard(&self, room_id: i64) -> RepoResult<Vec<LeaderboardEntry>>;

    async fn list_questions(&self) -> RepoResult<Vec<Question>>;

    /// Looks a language up by its canonical (normalized) name.
    async fn get_language_by_name(&self, name: &str) -> RepoResult<Language>;

    async fn get_submission(&self, id: i64) -> RepoResult<Submission>;
    async fn update_submission(&self, submission: Submission) -> RepoResult<Submission>;
}
