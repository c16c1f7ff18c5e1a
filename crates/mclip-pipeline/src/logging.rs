//! Structured job logging.
//!
//! Every line carries the job id and the pipeline step, plus the clip id
//! when one is in scope.

use tracing::{error, info, warn, Span};

use mclip_models::{ClipId, JobId};

/// Job logger with consistent structured fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    step: String,
    clip_id: Option<String>,
}

impl JobLogger {
    pub fn new(job_id: &JobId, step: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            step: step.to_string(),
            clip_id: None,
        }
    }

    /// Logger scoped to one clip of the job.
    pub fn for_clip(&self, clip_id: &ClipId) -> Self {
        Self {
            clip_id: Some(clip_id.to_string()),
            ..self.clone()
        }
    }

    fn clip(&self) -> &str {
        self.clip_id.as_deref().unwrap_or("")
    }

    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, step = %self.step, clip_id = %self.clip(), "Step started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(job_id = %self.job_id, step = %self.step, clip_id = %self.clip(), "{}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, step = %self.step, clip_id = %self.clip(), "{}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, step = %self.step, clip_id = %self.clip(), "{}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job_id, step = %self.step, clip_id = %self.clip(), "Step completed: {}", message);
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn step(&self) -> &str {
        &self.step
    }

    /// Span for instrumenting a whole handler.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "pipeline_step",
            job_id = %self.job_id,
            step = %self.step,
            clip_id = %self.clip()
        )
    }
}
