//! Conditional updates for jobs and clips.
//!
//! Every status change in the pipeline is a check-then-write: the store
//! re-reads the record, asks the patch whether it still applies, and only
//! then writes (conditionally on the record not having changed since the
//! read). Both the Firestore and in-memory stores share these rules.

use chrono::{DateTime, Utc};

use crate::{Clip, ClipStatus, Job, JobStatus};

/// Update moving a job to a new status.
#[derive(Debug, Clone, PartialEq)]
pub struct JobPatch {
    pub status: JobStatus,
    pub progress: Option<u8>,
    pub video_duration: Option<f64>,
    pub analysis: Option<String>,
    pub transcription_id: Option<String>,
    pub error_message: Option<String>,
    /// Stamp `started_at`
    pub stamp_started: bool,
}

impl JobPatch {
    pub fn to(status: JobStatus) -> Self {
        Self {
            status,
            progress: None,
            video_duration: None,
            analysis: None,
            transcription_id: None,
            error_message: None,
            stamp_started: false,
        }
    }

    /// Failure patch carrying the root cause.
    pub fn failed(error: impl Into<String>) -> Self {
        Self::to(JobStatus::Failed).with_error(error)
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_video_duration(mut self, secs: f64) -> Self {
        self.video_duration = Some(secs);
        self
    }

    pub fn with_analysis(mut self, analysis: impl Into<String>) -> Self {
        self.analysis = Some(analysis.into());
        self
    }

    pub fn with_transcription_id(mut self, id: impl Into<String>) -> Self {
        self.transcription_id = Some(id.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self
    }

    pub fn started(mut self) -> Self {
        self.stamp_started = true;
        self
    }

    /// Whether the patch is a legal transition from the job's current state.
    pub fn admits(&self, job: &Job) -> bool {
        job.status.can_transition_to(self.status)
    }

    /// Stamp `completed_at` when the patch completes the job.
    pub fn stamps_completion(&self) -> bool {
        self.status == JobStatus::Completed
    }

    /// Apply to an in-memory record.
    pub fn apply(&self, job: &mut Job, now: DateTime<Utc>) {
        job.status = self.status;
        if let Some(progress) = self.progress {
            job.progress = progress;
        }
        if let Some(duration) = self.video_duration {
            job.video_duration = duration;
        }
        if let Some(analysis) = &self.analysis {
            job.analysis = Some(analysis.clone());
        }
        if let Some(id) = &self.transcription_id {
            job.transcription_id = Some(id.clone());
        }
        if let Some(error) = &self.error_message {
            job.error_message = Some(error.clone());
        }
        if self.stamp_started {
            job.started_at = Some(now);
        }
        if self.stamps_completion() {
            job.completed_at = Some(now);
        }
        job.updated_at = now;
    }
}

/// Precondition a clip must satisfy for a [`ClipPatch`] to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipGuard {
    /// Clip is exactly in this status.
    Status(ClipStatus),
    /// Clip is rendering and no asset has been persisted yet.
    AwaitingRender,
    /// Clip has a persisted asset and is waiting on its thumbnail.
    AwaitingThumbnail,
    /// Clip is not yet terminal.
    NonTerminal,
}

impl ClipGuard {
    pub fn admits(&self, clip: &Clip) -> bool {
        match self {
            ClipGuard::Status(status) => clip.status == *status,
            ClipGuard::AwaitingRender => {
                clip.status == ClipStatus::Processing && clip.asset_url.is_none()
            }
            ClipGuard::AwaitingThumbnail => {
                clip.status == ClipStatus::Processing && clip.asset_url.is_some()
            }
            ClipGuard::NonTerminal => !clip.status.is_terminal(),
        }
    }
}

/// Guarded update to one clip.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipPatch {
    pub guard: ClipGuard,
    pub status: Option<ClipStatus>,
    pub progress: Option<u8>,
    pub asset_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub size_bytes: Option<u64>,
    pub render_id: Option<String>,
    pub error_message: Option<String>,
}

impl ClipPatch {
    pub fn when(guard: ClipGuard) -> Self {
        Self {
            guard,
            status: None,
            progress: None,
            asset_url: None,
            thumbnail_url: None,
            size_bytes: None,
            render_id: None,
            error_message: None,
        }
    }

    pub fn status(mut self, status: ClipStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn asset(mut self, url: impl Into<String>, size_bytes: u64) -> Self {
        self.asset_url = Some(url.into());
        self.size_bytes = Some(size_bytes);
        self
    }

    pub fn thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(url.into());
        self
    }

    pub fn render_id(mut self, id: impl Into<String>) -> Self {
        self.render_id = Some(id.into());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self
    }

    /// Guard holds and any status change is a legal transition.
    pub fn admits(&self, clip: &Clip) -> bool {
        self.guard.admits(clip)
            && self
                .status
                .map_or(true, |next| clip.status.can_transition_to(next))
    }

    /// Stamp `completed_at` when the patch moves the clip to a terminal state.
    pub fn stamps_completion(&self) -> bool {
        self.status.is_some_and(|s| s.is_terminal())
    }

    pub fn apply(&self, clip: &mut Clip, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            clip.status = status;
        }
        if let Some(progress) = self.progress {
            clip.progress = progress;
        }
        if let Some(url) = &self.asset_url {
            clip.asset_url = Some(url.clone());
        }
        if let Some(url) = &self.thumbnail_url {
            clip.thumbnail_url = Some(url.clone());
        }
        if let Some(size) = self.size_bytes {
            clip.size_bytes = size;
        }
        if let Some(id) = &self.render_id {
            clip.render_id = Some(id.clone());
        }
        if let Some(error) = &self.error_message {
            clip.error_message = Some(error.clone());
        }
        if self.stamps_completion() {
            clip.completed_at = Some(now);
        }
        clip.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GenerationContext, JobId, Moment, MomentScores, MomentType};

    fn clip(status: ClipStatus, asset: Option<&str>) -> Clip {
        let moment = Moment {
            start_time: 0.0,
            end_time: 30.0,
            moment_type: MomentType::Hook,
            scores: MomentScores::default(),
            why_selected: String::new(),
            suggested_caption: String::new(),
            transcript_excerpt: String::new(),
        };
        let mut clip = Clip::from_moment(&JobId::from_string("j"), &moment);
        clip.status = status;
        clip.asset_url = asset.map(str::to_string);
        clip
    }

    #[test]
    fn test_job_patch_respects_state_machine() {
        let mut job = Job::new("u", "s", GenerationContext::default());
        job.status = JobStatus::Clipping;

        assert!(JobPatch::to(JobStatus::Completed).admits(&job));
        assert!(!JobPatch::to(JobStatus::Analyzing).admits(&job));

        job.status = JobStatus::Completed;
        assert!(!JobPatch::to(JobStatus::Completed).admits(&job));
        assert!(!JobPatch::failed("late").admits(&job));
    }

    #[test]
    fn test_job_patch_apply_stamps_completion() {
        let mut job = Job::new("u", "s", GenerationContext::default());
        job.status = JobStatus::Clipping;
        let now = Utc::now();
        JobPatch::to(JobStatus::Completed).with_progress(100).apply(&mut job, now);

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.completed_at, Some(now));
    }

    #[test]
    fn test_clip_guards() {
        let rendering = clip(ClipStatus::Processing, None);
        let rendered = clip(ClipStatus::Processing, Some("https://cdn/x.mp4"));

        assert!(ClipGuard::AwaitingRender.admits(&rendering));
        assert!(!ClipGuard::AwaitingRender.admits(&rendered));
        assert!(ClipGuard::AwaitingThumbnail.admits(&rendered));
        assert!(ClipGuard::NonTerminal.admits(&rendering));
        assert!(!ClipGuard::NonTerminal.admits(&clip(ClipStatus::Failed, None)));
    }

    #[test]
    fn test_clip_patch_rejects_illegal_status() {
        let done = clip(ClipStatus::Completed, None);
        let patch = ClipPatch::when(ClipGuard::Status(ClipStatus::Completed)).status(ClipStatus::Failed);
        assert!(!patch.admits(&done));
    }

    #[test]
    fn test_clip_patch_apply() {
        let mut c = clip(ClipStatus::Processing, None);
        let now = Utc::now();
        ClipPatch::when(ClipGuard::AwaitingRender)
            .asset("https://cdn/c.mp4", 2048)
            .progress(70)
            .apply(&mut c, now);

        assert_eq!(c.status, ClipStatus::Processing);
        assert_eq!(c.asset_url.as_deref(), Some("https://cdn/c.mp4"));
        assert_eq!(c.size_bytes, 2048);
        assert!(c.completed_at.is_none());

        ClipPatch::when(ClipGuard::AwaitingThumbnail)
            .status(ClipStatus::Completed)
            .apply(&mut c, now);
        assert_eq!(c.completed_at, Some(now));
    }
}
