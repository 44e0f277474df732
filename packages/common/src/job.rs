use serde::{Deserialize, Serialize};

/// Outcome of a single execution job, delivered exactly once over the job's
/// result sink. On failure `output` carries stderr.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct JobResult {
    pub output: String,
    pub success: bool,
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

impl JobResult {
    /// The sentinel returned synchronously when the job queue sheds load.
    pub fn rejected() -> Self {
        Self::default()
    }

    pub fn succeeded(output: String, execution_time_ms: u64) -> Self {
        Self {
            output,
            success: true,
            error: None,
            execution_time_ms,
        }
    }

    pub fn failed(output: String, error: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            output,
            success: false,
            error: Some(error.into()),
            execution_time_ms,
        }
    }
}
