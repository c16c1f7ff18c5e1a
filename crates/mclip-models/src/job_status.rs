//! Job status state machine.
//!
//! Jobs move strictly forward through the pipeline stages. `Failed` is
//! reachable from every non-terminal state; nothing leaves a terminal state.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Progress checkpoints recorded alongside status transitions.
pub mod progress {
    pub const TRANSCRIBING: u8 = 10;
    pub const ANALYZING: u8 = 30;
    pub const CLIPPING: u8 = 60;
    pub const COMPLETED: u8 = 100;
}

/// Job processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job created, transcription not yet requested
    #[default]
    Pending,
    /// Waiting on the external transcription service
    Transcribing,
    /// Transcript parsed, selecting moments
    Analyzing,
    /// Clips created, waiting on renders and thumbnails
    Clipping,
    /// Every clip reached a terminal state
    Completed,
    /// Job-level failure
    Failed,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Transcribing => "transcribing",
            JobStatus::Analyzing => "analyzing",
            JobStatus::Clipping => "clipping",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Parse from the stored string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "transcribing" => Some(JobStatus::Transcribing),
            "analyzing" => Some(JobStatus::Analyzing),
            "clipping" => Some(JobStatus::Clipping),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Pending, Transcribing)
            | (Transcribing, Analyzing)
            | (Analyzing, Clipping)
            | (Clipping, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
