//! Clip records: one candidate moment rendered (or not) into a short video.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{JobId, Moment, MomentScores, MomentType};

/// Unique identifier for a clip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ClipId(pub String);

impl ClipId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Stable id for the `index`-th accepted moment of a job, so a resumed
    /// clipping pass finds the clips an earlier pass already created.
    pub fn for_moment(job_id: &JobId, index: usize) -> Self {
        Self(format!("{}-m{:02}", job_id, index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a clip.
///
/// `Pending -> Processing -> Completed` when rendering, `Pending -> Completed`
/// in metadata-only mode, and `{Pending, Processing} -> Failed` on errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClipStatus {
    /// Clip row created, nothing triggered yet
    #[default]
    Pending,
    /// Render or thumbnail job in flight
    Processing,
    /// Clip finished (with or without a rendered asset)
    Completed,
    /// Render or trigger failed
    Failed,
}

impl ClipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipStatus::Pending => "pending",
            ClipStatus::Processing => "processing",
            ClipStatus::Completed => "completed",
            ClipStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ClipStatus::Pending),
            "processing" => Some(ClipStatus::Processing),
            "completed" => Some(ClipStatus::Completed),
            "failed" => Some(ClipStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ClipStatus::Completed | ClipStatus::Failed)
    }

    pub fn can_transition_to(&self, next: ClipStatus) -> bool {
        use ClipStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Completed)
                | (Processing, Completed)
                | (Pending, Failed)
                | (Processing, Failed)
        )
    }
}

impl fmt::Display for ClipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A clip stored under its owning job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Clip {
    pub id: ClipId,

    /// Owning job
    pub job_id: JobId,

    /// Start time in seconds
    pub start_time: f64,

    /// End time in seconds
    pub end_time: f64,

    /// Duration in seconds
    pub duration: f64,

    pub moment_type: MomentType,

    pub scores: MomentScores,

    pub why_selected: String,

    pub suggested_caption: String,

    pub transcript_excerpt: String,

    #[serde(default)]
    pub status: ClipStatus,

    /// Processing progress percentage (0-100)
    #[serde(default)]
    pub progress: u8,

    /// Public URL of the rendered asset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,

    #[serde(default)]
    pub size_bytes: u64,

    /// External render prediction id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Clip {
    /// Create a pending clip from an accepted moment.
    pub fn from_moment(job_id: &JobId, moment: &Moment) -> Self {
        let now = Utc::now();
        Self {
            id: ClipId::new(),
            job_id: job_id.clone(),
            start_time: moment.start_time,
            end_time: moment.end_time,
            duration: moment.duration(),
            moment_type: moment.moment_type,
            scores: moment.scores,
            why_selected: moment.why_selected.clone(),
            suggested_caption: moment.suggested_caption.clone(),
            transcript_excerpt: moment.transcript_excerpt.clone(),
            status: ClipStatus::Pending,
            progress: 0,
            asset_url: None,
            thumbnail_url: None,
            size_bytes: 0,
            render_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Storage key for the rendered asset.
    pub fn asset_key(&self) -> String {
        format!("jobs/{}/clips/{}.mp4", self.job_id, self.id)
    }

    /// Storage key for the thumbnail image.
    pub fn thumbnail_key(&self) -> String {
        format!("jobs/{}/thumbnails/{}.jpg", self.job_id, self.id)
    }
}
