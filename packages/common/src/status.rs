use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal and in-flight states of a submission as it moves through the
/// judging pipeline. Numeric ids are part of the external contract (callback
/// payloads carry them) and must stay stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SubmissionStatus {
    InQueue,
    Processing,
    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    CompilationError,
    RuntimeSigsegv,
    RuntimeSigxfsz,
    RuntimeSigfpe,
    RuntimeSigabrt,
    RuntimeNzec,
    RuntimeOther,
    InternalError,
    ExecFormatError,
}

impl SubmissionStatus {
    /// All status values, in id order.
    pub const ALL: &'static [SubmissionStatus] = &[
        Self::InQueue,
        Self::Processing,
        Self::Accepted,
        Self::WrongAnswer,
        Self::TimeLimitExceeded,
        Self::CompilationError,
        Self::RuntimeSigsegv,
        Self::RuntimeSigxfsz,
        Self::RuntimeSigfpe,
        Self::RuntimeSigabrt,
        Self::RuntimeNzec,
        Self::RuntimeOther,
        Self::InternalError,
        Self::ExecFormatError,
    ];

    /// Stable numeric id used in callback payloads.
    pub fn id(&self) -> i64 {
        match self {
            Self::InQueue => 1,
            Self::Processing => 2,
            Self::Accepted => 3,
            Self::WrongAnswer => 4,
            Self::TimeLimitExceeded => 5,
            Self::CompilationError => 6,
            Self::RuntimeSigsegv => 7,
            Self::RuntimeSigxfsz => 8,
            Self::RuntimeSigfpe => 9,
            Self::RuntimeSigabrt => 10,
            Self::RuntimeNzec => 11,
            Self::RuntimeOther => 12,
            Self::InternalError => 13,
            Self::ExecFormatError => 14,
        }
    }

    pub fn from_id(id: i64) -> Option<SubmissionStatus> {
        Self::ALL.iter().copied().find(|s| s.id() == id)
    }

    /// Human-readable description, as reported to callback consumers.
    pub fn description(&self) -> &'static str {
        match self {
            Self::InQueue => "In Queue",
            Self::Processing => "Processing",
            Self::Accepted => "Accepted",
            Self::WrongAnswer => "Wrong Answer",
            Self::TimeLimitExceeded => "Time Limit Exceeded",
            Self::CompilationError => "Compilation Error",
            Self::RuntimeSigsegv => "Runtime Error (SIGSEGV)",
            Self::RuntimeSigxfsz => "Runtime Error (SIGXFSZ)",
            Self::RuntimeSigfpe => "Runtime Error (SIGFPE)",
            Self::RuntimeSigabrt => "Runtime Error (SIGABRT)",
            Self::RuntimeNzec => "Runtime Error (NZEC)",
            Self::RuntimeOther => "Runtime Error (Other)",
            Self::InternalError => "Internal Error",
            Self::ExecFormatError => "Exec Format Error",
        }
    }

    /// Returns true once judging is complete and the status will not change.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InQueue | Self::Processing)
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl Default for SubmissionStatus {
    fn default() -> Self {
        Self::InQueue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_stable() {
        for (i, status) in SubmissionStatus::ALL.iter().enumerate() {
            assert_eq!(status.id(), (i + 1) as i64);
            assert_eq!(SubmissionStatus::from_id(status.id()), Some(*status));
        }
        assert_eq!(SubmissionStatus::from_id(0), None);
        assert_eq!(SubmissionStatus::from_id(15), None);
    }

    #[test]
    fn terminal_states() {
        assert!(!SubmissionStatus::InQueue.is_terminal());
        assert!(!SubmissionStatus::Processing.is_terminal());
        assert!(SubmissionStatus::Accepted.is_terminal());
        assert!(SubmissionStatus::ExecFormatError.is_terminal());
    }

    #[test]
    fn serde_roundtrip() {
        for status in SubmissionStatus::ALL {
            let json = serde_json::to_string(status).unwrap();
            let parsed: SubmissionStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(*status, parsed);
        }
    }
}
