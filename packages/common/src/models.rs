use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::SubmissionStatus;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: i64,
    pub name: String,
    /// Salted hash of the player's password. Never serialized to clients.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: i64,
    pub name: String,
    pub description: String,
}

/// A player's presence in a room. Within a room, `place` values of present
/// members always form a permutation of 1..=N, 1 being the highest score.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMembership {
    pub room_id: i64,
    pub player_id: i64,
    #[serde(rename = "points")]
    pub score: u32,
    pub place: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub score: i64,
    /// 1 = easy, 2 = medium, 3 = hard.
    pub difficulty: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub player_name: String,
    pub score: u32,
    pub place: u32,
}

/// A persisted judge submission with its resource limits and output fields.
/// Created in `InQueue`, mutated by the judgement job until terminal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub token: String,
    pub player_id: i64,
    pub room_id: i64,
    pub question_id: i64,
    pub language_id: i64,

    pub source_code: Option<String>,
    pub stdin: Option<String>,
    pub expected_output: Option<String>,
    pub compiler_options: Option<String>,
    pub command_line_arguments: Option<String>,
    /// Zip archive of extra files, unpacked inside the sandbox.
    pub additional_files: Option<Vec<u8>>,

    // Limits. Times in seconds, sizes in kilobytes.
    pub cpu_time_limit: f64,
    pub cpu_extra_time: f64,
    pub wall_time_limit: f64,
    pub stack_limit: i64,
    pub max_processes_and_or_threads: i64,
    pub memory_limit: i64,
    pub max_file_size: i64,
    pub enable_network: bool,
    pub redirect_stderr_to_stdout: bool,
    pub enable_per_process_and_thread_time_limit: bool,
    pub enable_per_process_and_thread_memory_limit: bool,

    // Output fields, populated by the judgement job.
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    pub time: Option<f64>,
    pub wall_time: Option<f64>,
    pub memory: Option<i64>,
    pub exit_code: Option<i64>,
    pub exit_signal: Option<i64>,
    pub message: Option<String>,

    pub status: SubmissionStatus,
    pub callback_url: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub execution_host: Option<String>,
}

impl Submission {
    /// A fresh in-queue submission with the default judge limits.
    pub fn new(
        id: i64,
        token: impl Into<String>,
        player_id: i64,
        room_id: i64,
        question_id: i64,
        language_id: i64,
        source_code: impl Into<String>,
    ) -> Self {
        Self {
            id,
            token: token.into(),
            player_id,
            room_id,
            question_id,
            language_id,
            source_code: Some(source_code.into()),
            stdin: None,
            expected_output: None,
            compiler_options: None,
            command_line_arguments: None,
            additional_files: None,
            cpu_time_limit: 5.0,
            cpu_extra_time: 1.0,
            wall_time_limit: 10.0,
            stack_limit: 64_000,
            max_processes_and_or_threads: 60,
            memory_limit: 128_000,
            max_file_size: 1_024,
            enable_network: false,
            redirect_stderr_to_stdout: false,
            enable_per_process_and_thread_time_limit: false,
            enable_per_process_and_thread_memory_limit: false,
            stdout: None,
            stderr: None,
            compile_output: None,
            time: None,
            wall_time: None,
            memory: None,
            exit_code: None,
            exit_signal: None,
            message: None,
            status: SubmissionStatus::InQueue,
            callback_url: None,
            started_at: None,
            finished_at: None,
            execution_host: None,
        }
    }

    /// Clears every runtime output field. Used when a submission terminates
    /// before its run phase (e.g. compilation failure).
    pub fn clear_run_output(&mut self) {
        self.time = None;
        self.wall_time = None;
        self.memory = None;
        self.stdout = None;
        self.stderr = None;
        self.exit_code = None;
        self.exit_signal = None;
        self.message = None;
    }
}
