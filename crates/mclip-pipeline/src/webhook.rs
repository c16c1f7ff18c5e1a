//! Webhook dispatch.
//!
//! Every external completion event arrives here with the continuation that
//! was embedded in its callback URL. The event is validated, the
//! continuation decoded (and verified when signing is enabled) and checked
//! against stored records before anything is mutated.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::Instrument;

use mclip_models::{
    progress, AnalysisSnapshot, Clip, Continuation, Job, JobId, JobPatch, JobStatus, PipelineStep,
    TranscriptSegment,
};
use mclip_services::ExternalStatus;

use crate::analyzer::AnalysisInput;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::JobLogger;
use crate::metrics::{record_job_finished, record_webhook};
use crate::transcript::{parse_transcript, TranscriptInput};
use crate::Pipeline;

/// Continuation as received in the callback query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookQuery {
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
    pub step: Option<String>,
    #[serde(rename = "clipId")]
    pub clip_id: Option<String>,
    pub sig: Option<String>,
}

/// Completion event body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl WebhookEvent {
    fn required(&self) -> PipelineResult<(&str, &str)> {
        let id = self
            .id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PipelineError::invalid_webhook("missing id"))?;
        let status = self
            .status
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PipelineError::invalid_webhook("missing status"))?;
        Ok((id, status))
    }

    /// Output as a single URL.
    pub fn output_url(&self) -> Option<String> {
        self.output.as_ref().and_then(output_url)
    }

    /// Error as a readable message.
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => ["message", "detail", "error"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .map(str::to_string)
                .or_else(|| Some(Value::Object(map.clone()).to_string())),
            other => Some(other.to_string()),
        }
    }
}

/// Extract a URL from the shapes services use for `output`: a string, an
/// array whose first element is the value, or an object with an `output`
/// or `url` field.
pub fn output_url(output: &Value) -> Option<String> {
    match output {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Array(items) => items.first().and_then(output_url),
        Value::Object(map) => map
            .get("output")
            .or_else(|| map.get("url"))
            .and_then(output_url),
        _ => None,
    }
}

/// Response body for a processed webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookOutcome {
    pub handled: bool,
    pub step: PipelineStep,
}

impl Pipeline {
    /// Route one completion event.
    pub async fn handle_webhook(
        &self,
        query: &WebhookQuery,
        event: &WebhookEvent,
    ) -> PipelineResult<WebhookOutcome> {
        let step_label = query.step.clone().unwrap_or_else(|| "unknown".to_string());
        let result = self.dispatch(query, event).await;
        let outcome = match &result {
            Ok(o) if o.handled => "handled",
            Ok(_) => "ignored",
            Err(e) if e.is_bad_request() || e.is_unauthorized() || e.is_not_found() => "rejected",
            Err(_) => "error",
        };
        record_webhook(&step_label, outcome);
        result
    }

    async fn dispatch(&self, query: &WebhookQuery, event: &WebhookEvent) -> PipelineResult<WebhookOutcome> {
        let (external_id, status) = event.required()?;
        let continuation = Continuation::from_query(
            query.job_id.as_deref(),
            query.step.as_deref(),
            query.clip_id.as_deref(),
        )?;
        if let Some(secret) = &self.config.webhook_signing_secret {
            continuation.verify(secret, query.sig.as_deref())?;
        }

        let step = continuation.step;
        let job = self
            .ports
            .store
            .get_job(&continuation.job_id)
            .await?
            .ok_or_else(|| PipelineError::job_not_found(continuation.job_id.as_str()))?;
        let clip = match &continuation.clip_id {
            Some(clip_id) => Some(
                self.ports
                    .store
                    .get_clip(&job.id, clip_id)
                    .await?
                    .filter(|c| c.job_id == job.id)
                    .ok_or_else(|| PipelineError::clip_not_found(clip_id.as_str()))?,
            ),
            None => None,
        };

        let mut logger = JobLogger::new(&job.id, step.as_str());
        if let Some(clip) = &clip {
            logger = logger.for_clip(&clip.id);
        }
        let external = ExternalStatus::parse(status);
        logger.log_start(&format!("Webhook {} reported {}", external_id, status));

        let succeeded = match external {
            ExternalStatus::Succeeded => true,
            ExternalStatus::Failed | ExternalStatus::Canceled => false,
            _ => {
                logger.log_progress(&format!("Ignoring non-terminal status {}", status));
                return Ok(WebhookOutcome { handled: false, step });
            }
        };

        let handled = self
            .route(step, job, clip, event, succeeded)
            .instrument(logger.create_span())
            .await?;

        Ok(WebhookOutcome { handled, step })
    }

    async fn route(
        &self,
        step: PipelineStep,
        job: Job,
        clip: Option<Clip>,
        event: &WebhookEvent,
        succeeded: bool,
    ) -> PipelineResult<bool> {
        let clip = match (step, clip) {
            (PipelineStep::Transcribe, _) => {
                return self.on_transcription(job, event, succeeded).await;
            }
            (_, Some(clip)) => clip,
            (_, None) => return Err(PipelineError::invalid_webhook("missing clipId")),
        };

        let handled = match (step, succeeded) {
            (PipelineStep::Thumbnail, _) => {
                let output = if succeeded { event.output_url() } else { None };
                self.on_thumbnail(&job.id, &clip, output).await?
            }
            (_, true) => self.on_render_succeeded(&job.id, &clip, event.output_url()).await?,
            (_, false) => self.on_render_failed(&job.id, &clip, event.error_message()).await?,
        };
        // Duplicates aggregate too, finishing a job whose last delivery died mid-way.
        self.finalize_if_complete(&job.id).await?;
        Ok(handled)
    }

    /// Transcription finished. The ANALYZING transition is the claim: a
    /// duplicate delivery finds the job already past TRANSCRIBING and stops,
    /// unless an earlier delivery reached CLIPPING and broke off, in which
    /// case the clipping pass is resumed.
    async fn on_transcription(&self, job: Job, event: &WebhookEvent, succeeded: bool) -> PipelineResult<bool> {
        let logger = JobLogger::new(&job.id, "transcribe");
        let store = &self.ports.store;

        if job.status == JobStatus::Clipping {
            return self.resume_clipping(&job).await;
        }

        if !succeeded {
            let reason = event
                .error_message()
                .unwrap_or_else(|| "unknown error".to_string());
            return self.fail_job(&job.id, format!("Transcription failed: {}", reason)).await;
        }

        if job.status == JobStatus::Pending {
            // Webhook beat the submission's own TRANSCRIBING write.
            let patch = JobPatch::to(JobStatus::Transcribing)
                .with_progress(progress::TRANSCRIBING)
                .started();
            store.apply_job_patch(&job.id, &patch).await?;
        }

        let claim = JobPatch::to(JobStatus::Analyzing).with_progress(progress::ANALYZING);
        let Some(job) = store.apply_job_patch(&job.id, &claim).await? else {
            logger.log_progress("Transcription already handled");
            return Ok(false);
        };

        // No clip exists yet, so any failure up to here is final for the job.
        let (job, snapshot) = match self.analyze(&job, event.output.as_ref()).await {
            Ok(Some(analyzed)) => analyzed,
            Ok(None) => return Ok(true),
            Err(e) => {
                let reason = match e {
                    PipelineError::Transcript(msg) | PipelineError::AnalysisFailed(msg) => msg,
                    other => other.to_string(),
                };
                self.fail_job(&job.id, reason).await?;
                return Ok(true);
            }
        };

        // From here on errors go back to the caller; the redelivery resumes.
        self.run_clipping(&job, &snapshot).await?;
        Ok(true)
    }

    /// Parse, resolve and analyze, then move the job to CLIPPING with the
    /// accepted moments stored on it. `None` if the job left ANALYZING.
    async fn analyze(
        &self,
        job: &Job,
        output: Option<&Value>,
    ) -> PipelineResult<Option<(Job, AnalysisSnapshot)>> {
        let logger = JobLogger::new(&job.id, "analyze");

        let mut input = output
            .and_then(TranscriptInput::from_output)
            .ok_or_else(|| PipelineError::Transcript("Transcription returned no transcript".to_string()))?;
        if let Some(url) = input.remote_url() {
            let bytes = self.ports.assets.fetch(url).await?;
            input = TranscriptInput::Text(String::from_utf8_lossy(&bytes).into_owned());
        }

        let segments = parse_transcript(&input);
        if segments.is_empty() {
            return Err(PipelineError::Transcript(
                "Transcript contained no usable segments".to_string(),
            ));
        }
        logger.log_progress(&format!("Parsed {} transcript segments", segments.len()));

        let resolved = self.ports.resolver.resolve(&job.source_url).await;
        let direct_url = resolved.as_ref().and_then(|r| r.url.clone());
        let video_duration = effective_duration(
            job.video_duration,
            resolved.as_ref().and_then(|r| r.duration),
            &segments,
        );

        let outcome = self
            .analyzers
            .run(&AnalysisInput {
                segments: &segments,
                context: &job.context,
                video_duration,
            })
            .await?;
        if outcome.moments.is_empty() {
            return Err(PipelineError::analysis_failed(
                "No marketing moments found in transcript",
            ));
        }

        let snapshot = AnalysisSnapshot {
            analyzer: outcome.analyzer.to_string(),
            moments: outcome.moments,
            video_duration,
            direct_source: direct_url.is_some(),
            direct_url,
        };
        let patch = JobPatch::to(JobStatus::Clipping)
            .with_progress(progress::CLIPPING)
            .with_video_duration(video_duration)
            .with_analysis(serde_json::to_string(&snapshot)?);
        let Some(job) = self.ports.store.apply_job_patch(&job.id, &patch).await? else {
            logger.log_warning("Job left ANALYZING before clips were created");
            return Ok(None);
        };

        logger.log_progress(&format!(
            "{} selected {} moments ({})",
            snapshot.analyzer,
            snapshot.moments.len(),
            if snapshot.direct_source { "rendering" } else { "metadata only" }
        ));
        Ok(Some((job, snapshot)))
    }

    /// Create and advance clips for the stored moments, then aggregate.
    /// Returns whether anything moved.
    async fn run_clipping(&self, job: &Job, snapshot: &AnalysisSnapshot) -> PipelineResult<bool> {
        let advanced = self
            .create_clips(job, &snapshot.moments, snapshot.direct_url.as_deref())
            .await?;
        let finalized = self.finalize_if_complete(&job.id).await?;
        Ok(advanced > 0 || finalized.is_some())
    }

    /// Transcription redelivered while the job is CLIPPING.
    async fn resume_clipping(&self, job: &Job) -> PipelineResult<bool> {
        let logger = JobLogger::new(&job.id, "transcribe");
        let Some(snapshot) = job.analysis_snapshot() else {
            logger.log_warning("Job is clipping without a stored analysis");
            return Ok(false);
        };
        let moved = self.run_clipping(job, &snapshot).await?;
        if moved {
            logger.log_progress("Resumed an interrupted clipping pass");
        } else {
            logger.log_progress("Transcription already handled");
        }
        Ok(moved)
    }

    /// Move a non-terminal job to FAILED.
    pub(crate) async fn fail_job(&self, job_id: &JobId, reason: String) -> PipelineResult<bool> {
        let logger = JobLogger::new(job_id, "fail");
        let failed = self
            .ports
            .store
            .apply_job_patch(job_id, &JobPatch::failed(reason.clone()))
            .await?
            .is_some();
        if failed {
            record_job_finished("failed");
            logger.log_error(&format!("Job failed: {}", reason));
        }
        Ok(failed)
    }
}

/// Job estimate, else resolver duration, else end of the transcript.
fn effective_duration(estimate: f64, resolved: Option<f64>, segments: &[TranscriptSegment]) -> f64 {
    if estimate > 0.0 {
        return estimate;
    }
    if let Some(duration) = resolved.filter(|d| *d > 0.0) {
        return duration;
    }
    segments.iter().map(|s| s.end).fold(0.0, f64::max)
}
