//! Job submission.

use mclip_models::{progress, Continuation, GenerationContext, Job, JobPatch, JobStatus};

use crate::error::{PipelineError, PipelineResult};
use crate::logging::JobLogger;
use crate::Pipeline;

/// A validated request to clip one video.
#[derive(Debug, Clone)]
pub struct JobSubmission {
    pub source_url: String,
    /// Caller's duration estimate in seconds
    pub video_duration: Option<f64>,
    pub context: GenerationContext,
}

impl Pipeline {
    /// Create a job and start its transcription.
    ///
    /// Fails before anything is written when the media service has no
    /// credentials. A rejected transcription request leaves the job FAILED.
    pub async fn submit_job(&self, user_id: &str, submission: JobSubmission) -> PipelineResult<Job> {
        if !self.ports.media.is_configured() {
            return Err(PipelineError::config_error("media service credentials not configured"));
        }

        let job = Job::new(user_id, submission.source_url, submission.context)
            .with_video_duration(submission.video_duration.unwrap_or(0.0));
        self.ports.store.create_job(&job).await?;

        let logger = JobLogger::new(&job.id, "transcribe");
        logger.log_start(&format!("Submitted {}", job.source_url));

        let continuation = Continuation::transcribe(&job.id);
        let transcription_id = match self
            .ports
            .media
            .start_transcription(&job.source_url, &continuation)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                let reason = format!("Failed to start transcription: {}", e);
                self.fail_job(&job.id, reason.clone()).await?;
                return Err(PipelineError::media_failed(reason));
            }
        };

        let patch = JobPatch::to(JobStatus::Transcribing)
            .with_progress(progress::TRANSCRIBING)
            .with_transcription_id(&transcription_id)
            .started();
        if let Some(updated) = self.ports.store.apply_job_patch(&job.id, &patch).await? {
            logger.log_progress(&format!("Transcription requested ({})", transcription_id));
            return Ok(updated);
        }

        // The completion webhook got there first and already advanced the job.
        self.ports
            .store
            .get_job(&job.id)
            .await?
            .ok_or_else(|| PipelineError::job_not_found(job.id.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MediaKind, RecordingMediaJobs};
    use crate::testkit::Harness;

    fn submission() -> JobSubmission {
        JobSubmission {
            source_url: "https://video.test/watch?v=9".to_string(),
            video_duration: Some(95.0),
            context: GenerationContext::default(),
        }
    }

    #[tokio::test]
    async fn test_submit_starts_transcription() {
        let h = Harness::unresolvable();
        let job = h.pipeline.submit_job("user-7", submission()).await.unwrap();

        assert_eq!(job.status, JobStatus::Transcribing);
        assert_eq!(job.progress, progress::TRANSCRIBING);
        assert_eq!(job.video_duration, 95.0);
        assert_eq!(job.transcription_id.as_deref(), Some("ext-1"));
        assert!(job.started_at.is_some());

        let requests = h.media.requests_of(MediaKind::Transcription).await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].continuation, Continuation::transcribe(&job.id));
    }

    #[tokio::test]
    async fn test_rejected_transcription_fails_job() {
        let h = Harness::unresolvable();
        h.media.fail(MediaKind::Transcription).await;

        let err = h.pipeline.submit_job("user-7", submission()).await.unwrap_err();
        assert!(matches!(err, PipelineError::MediaFailed(_)));

        let jobs = h.store.jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert!(jobs[0].error_message.as_deref().unwrap().starts_with("Failed to start transcription"));
    }

    #[tokio::test]
    async fn test_unconfigured_media_creates_nothing() {
        let h = Harness::with_media(RecordingMediaJobs::unconfigured());
        let err = h.pipeline.submit_job("user-7", submission()).await.unwrap_err();
        assert!(matches!(err, PipelineError::ConfigError(_)));
        assert!(h.media.requests().await.is_empty());
        assert!(h.store.jobs().await.is_empty());
    }
}
