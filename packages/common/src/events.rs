use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::job::JobResult;

/// Wire-level event type names pushed to SSE clients.
/// SOLUTION_SUBMITTED and COMPILATION_TEST are internal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SseEventType {
    CorrectSolutionSubmitted,
    WrongSolutionSubmitted,
    PlayerJoined,
    PlayerLeft,
    RoomDeleted,
    SolutionSubmitted,
    CompilationTest,
}

impl SseEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CorrectSolutionSubmitted => "CORRECT_SOLUTION_SUBMITTED",
            Self::WrongSolutionSubmitted => "WRONG_SOLUTION_SUBMITTED",
            Self::PlayerJoined => "PLAYER_JOINED",
            Self::PlayerLeft => "PLAYER_LEFT",
            Self::RoomDeleted => "ROOM_DELETED",
            Self::SolutionSubmitted => "SOLUTION_SUBMITTED",
            Self::CompilationTest => "COMPILATION_TEST",
        }
    }
}

impl fmt::Display for SseEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single frame delivered to one listener sink. `data` is opaque to the
/// dispatcher; handlers decide its shape per event type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SseEvent {
    #[serde(rename = "type")]
    pub event_type: SseEventType,
    pub data: String,
}

impl SseEvent {
    pub fn new(event_type: SseEventType, data: impl Into<String>) -> Self {
        Self {
            event_type,
            data: data.into(),
        }
    }
}

/// A solution posted to a room, before judging.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SolutionSubmitted {
    pub player_id: i64,
    pub room_id: i64,
    pub question_id: i64,
    pub code: String,
    pub language: String,
    pub submitted_at: DateTime<Utc>,
}

/// A judged solution, re-injected into the room inbox by the execution path.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SolutionJudged {
    pub submitted: SolutionSubmitted,
    pub result: JobResult,
}

/// Everything a room manager's inbox can carry. Events are processed
/// strictly in enqueue order by the room's single consumer task.
#[derive(Clone, Debug)]
pub enum DomainEvent {
    SolutionSubmitted(SolutionSubmitted),
    SolutionJudged(SolutionJudged),
    PlayerJoined { player_id: i64, room_id: i64 },
    PlayerLeft { player_id: i64, room_id: i64 },
    RoomDeleted { room_id: i64 },
    CompilationTest,
}
