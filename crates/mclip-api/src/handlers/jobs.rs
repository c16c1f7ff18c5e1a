//! Job submission.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use mclip_models::{GenerationContext, Job, JobStatus};
use mclip_pipeline::{JobSubmission, PipelineError};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics::record_job_submitted;
use crate::security::{sanitize_text, validate_source_url};
use crate::state::AppState;

/// `POST /api/jobs` body.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub source_url: String,
    #[validate(range(min = 0.0, max = 86400.0))]
    pub video_duration: Option<f64>,
    #[validate(length(max = 200))]
    pub industry: String,
    #[validate(length(max = 2000))]
    pub product_description: String,
    #[validate(length(max = 500))]
    pub target_audience: String,
    #[validate(range(min = 5.0, max = 180.0))]
    pub target_clip_duration: Option<f64>,
    #[validate(range(min = 1, max = 20))]
    pub max_clips: Option<u32>,
}

impl CreateJobRequest {
    fn into_submission(self, source_url: String) -> JobSubmission {
        let defaults = GenerationContext::default();
        JobSubmission {
            source_url,
            video_duration: self.video_duration,
            context: GenerationContext {
                industry: sanitize_text(&self.industry),
                product_description: sanitize_text(&self.product_description),
                target_audience: sanitize_text(&self.target_audience),
                target_clip_duration: self
                    .target_clip_duration
                    .unwrap_or(defaults.target_clip_duration),
                max_clips: self.max_clips.unwrap_or(defaults.max_clips),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            status: job.status,
            progress: job.progress,
            created_at: job.created_at,
        }
    }
}

/// Create a job and start its transcription.
pub async fn create_job(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<JobResponse>)> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let source_url =
        validate_source_url(&request.source_url).map_err(|e| ApiError::bad_request(e.to_string()))?;

    let job = match state
        .pipeline
        .submit_job(&user.uid, request.into_submission(source_url))
        .await
    {
        Ok(job) => job,
        Err(e) => {
            record_job_submitted(match e {
                PipelineError::MediaFailed(_) => "media_failed",
                _ => "error",
            });
            return Err(e.into());
        }
    };

    record_job_submitted("accepted");
    info!(job_id = %job.id, uid = %user.uid, "Job submitted");
    Ok((StatusCode::CREATED, Json(JobResponse::from(job))))
}
