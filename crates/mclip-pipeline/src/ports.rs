//! Seams between the pipeline and the outside world.
//!
//! Handlers only talk to these traits. Production wiring lives in
//! [`crate::adapters`]; [`crate::memory`] provides in-process versions for
//! tests and local runs.

use std::sync::Arc;

use async_trait::async_trait;

use mclip_models::{Clip, ClipId, ClipPatch, Continuation, Job, JobId, JobPatch, Notification};
use mclip_services::ResolvedSource;

use crate::error::PipelineResult;

/// Persistence for jobs and their clips.
///
/// `apply_*_patch` is a conditional write: it returns `None` when the patch
/// no longer applies to the stored record, and never overwrites a
/// concurrent change.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: &Job) -> PipelineResult<()>;

    async fn get_job(&self, job_id: &JobId) -> PipelineResult<Option<Job>>;

    async fn apply_job_patch(&self, job_id: &JobId, patch: &JobPatch) -> PipelineResult<Option<Job>>;

    async fn create_clip(&self, clip: &Clip) -> PipelineResult<()>;

    async fn get_clip(&self, job_id: &JobId, clip_id: &ClipId) -> PipelineResult<Option<Clip>>;

    async fn list_clips(&self, job_id: &JobId) -> PipelineResult<Vec<Clip>>;

    async fn apply_clip_patch(
        &self,
        job_id: &JobId,
        clip_id: &ClipId,
        patch: &ClipPatch,
    ) -> PipelineResult<Option<Clip>>;
}

/// Durable object storage plus fetching of temporary service outputs.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Download a (temporary) output URL.
    async fn fetch(&self, url: &str) -> PipelineResult<Vec<u8>>;

    /// Persist bytes under `key` and return the public URL.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> PipelineResult<String>;
}

/// External transcription, render and thumbnail jobs.
///
/// Each call registers the continuation so the completion webhook can
/// resume the right stage. Returns the external job id.
#[async_trait]
pub trait MediaJobs: Send + Sync {
    /// Whether credentials are present. Submission fails fast otherwise.
    fn is_configured(&self) -> bool {
        true
    }

    async fn start_transcription(
        &self,
        source_url: &str,
        continuation: &Continuation,
    ) -> PipelineResult<String>;

    async fn start_trim(
        &self,
        video_url: &str,
        start_secs: f64,
        end_secs: f64,
        continuation: &Continuation,
    ) -> PipelineResult<String>;

    async fn start_thumbnail(
        &self,
        video_url: &str,
        at_secs: f64,
        continuation: &Continuation,
    ) -> PipelineResult<String>;
}

/// Source page reference to direct stream URL. Failure is `None`.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve(&self, source_url: &str) -> Option<ResolvedSource>;
}

/// Delivery of the completion notification.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> PipelineResult<()>;
}

/// Every port the pipeline needs.
#[derive(Clone)]
pub struct Ports {
    pub store: Arc<dyn JobStore>,
    pub assets: Arc<dyn AssetStore>,
    pub media: Arc<dyn MediaJobs>,
    pub resolver: Arc<dyn SourceResolver>,
    pub notifier: Arc<dyn Notifier>,
}
