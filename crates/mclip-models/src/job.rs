//! Video-to-clips job records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use crate::{JobStatus, Moment};

/// Default target clip length in seconds.
pub const DEFAULT_TARGET_CLIP_DURATION: f64 = 30.0;

/// Default maximum number of clips per job.
pub const DEFAULT_MAX_CLIPS: u32 = 5;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Marketing context that steers moment selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct GenerationContext {
    #[validate(length(max = 200))]
    pub industry: String,

    #[validate(length(max = 2000))]
    pub product_description: String,

    #[validate(length(max = 500))]
    pub target_audience: String,

    /// Target clip length in seconds
    #[validate(range(min = 5.0, max = 180.0))]
    #[serde(default = "default_target_clip_duration")]
    pub target_clip_duration: f64,

    #[validate(range(min = 1, max = 20))]
    #[serde(default = "default_max_clips")]
    pub max_clips: u32,
}

fn default_target_clip_duration() -> f64 {
    DEFAULT_TARGET_CLIP_DURATION
}

fn default_max_clips() -> u32 {
    DEFAULT_MAX_CLIPS
}

impl Default for GenerationContext {
    fn default() -> Self {
        Self {
            industry: String::new(),
            product_description: String::new(),
            target_audience: String::new(),
            target_clip_duration: DEFAULT_TARGET_CLIP_DURATION,
            max_clips: DEFAULT_MAX_CLIPS,
        }
    }
}

impl GenerationContext {
    /// Duration band `[low * target, high * target]` in seconds.
    pub fn duration_band(&self, low: f64, high: f64) -> (f64, f64) {
        (
            self.target_clip_duration * low,
            self.target_clip_duration * high,
        )
    }
}

/// Serialized result of the analysis pass, stored on the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisSnapshot {
    /// Name of the analyzer that produced the accepted moments
    pub analyzer: String,
    pub moments: Vec<Moment>,
    /// Video duration the moments were clamped against
    pub video_duration: f64,
    /// Whether a direct source stream was resolved for rendering
    pub direct_source: bool,
    /// The resolved stream, kept so an interrupted clipping pass can resume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_url: Option<String>,
}

/// One video-to-clips request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Owning user
    pub user_id: String,

    /// Source page reference or uploaded object URL
    pub source_url: String,

    #[serde(default)]
    pub status: JobStatus,

    /// Progress percentage (0-100)
    #[serde(default)]
    pub progress: u8,

    /// Estimated video duration in seconds (0 when unknown)
    #[serde(default)]
    pub video_duration: f64,

    pub context: GenerationContext,

    /// JSON-encoded [`AnalysisSnapshot`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,

    /// External transcription prediction id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(
        user_id: impl Into<String>,
        source_url: impl Into<String>,
        context: GenerationContext,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            user_id: user_id.into(),
            source_url: source_url.into(),
            status: JobStatus::Pending,
            progress: 0,
            video_duration: 0.0,
            context,
            analysis: None,
            transcription_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Set the estimated video duration.
    pub fn with_video_duration(mut self, secs: f64) -> Self {
        self.video_duration = secs.max(0.0);
        self
    }

    /// Decode the stored analysis snapshot, if any.
    pub fn analysis_snapshot(&self) -> Option<AnalysisSnapshot> {
        self.analysis
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}
