//! Shared fixtures for pipeline unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use mclip_models::{
    Clip, ClipId, ClipPatch, ClipStatus, GenerationContext, Job, JobId, JobPatch, JobStatus,
    Moment, MomentScores, MomentType,
};

use crate::analyzer::{AnalyzerChain, KeywordAnalyzer};
use crate::memory::{
    MemoryAssetStore, MemoryJobStore, RecordingMediaJobs, RecordingNotifier, StaticResolver,
};
use crate::error::{PipelineError, PipelineResult};
use crate::ports::{JobStore, Ports};
use crate::{Pipeline, PipelineConfig};

pub(crate) struct Harness {
    pub pipeline: Pipeline,
    pub store: Arc<MemoryJobStore>,
    pub assets: Arc<MemoryAssetStore>,
    pub media: Arc<RecordingMediaJobs>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Memory store whose `list_clips` fails once, on the `fail_on`-th call.
pub(crate) struct FlakyJobStore {
    inner: Arc<MemoryJobStore>,
    list_calls: AtomicUsize,
    fail_on: usize,
}

#[async_trait]
impl JobStore for FlakyJobStore {
    async fn create_job(&self, job: &Job) -> PipelineResult<()> {
        self.inner.create_job(job).await
    }

    async fn get_job(&self, job_id: &JobId) -> PipelineResult<Option<Job>> {
        self.inner.get_job(job_id).await
    }

    async fn apply_job_patch(&self, job_id: &JobId, patch: &JobPatch) -> PipelineResult<Option<Job>> {
        self.inner.apply_job_patch(job_id, patch).await
    }

    async fn create_clip(&self, clip: &Clip) -> PipelineResult<()> {
        self.inner.create_clip(clip).await
    }

    async fn get_clip(&self, job_id: &JobId, clip_id: &ClipId) -> PipelineResult<Option<Clip>> {
        self.inner.get_clip(job_id, clip_id).await
    }

    async fn list_clips(&self, job_id: &JobId) -> PipelineResult<Vec<Clip>> {
        let call = self.list_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return Err(PipelineError::store("transient"));
        }
        self.inner.list_clips(job_id).await
    }

    async fn apply_clip_patch(
        &self,
        job_id: &JobId,
        clip_id: &ClipId,
        patch: &ClipPatch,
    ) -> PipelineResult<Option<Clip>> {
        self.inner.apply_clip_patch(job_id, clip_id, patch).await
    }
}

impl Harness {
    fn build(resolver: StaticResolver, media: RecordingMediaJobs, config: PipelineConfig) -> Self {
        let store = Arc::new(MemoryJobStore::new());
        Self::build_with_port(store.clone(), store, resolver, media, config)
    }

    fn build_with_port(
        store: Arc<MemoryJobStore>,
        store_port: Arc<dyn JobStore>,
        resolver: StaticResolver,
        media: RecordingMediaJobs,
        config: PipelineConfig,
    ) -> Self {
        let assets = Arc::new(MemoryAssetStore::default());
        let media = Arc::new(media);
        let notifier = Arc::new(RecordingNotifier::new());
        let ports = Ports {
            store: store_port,
            assets: assets.clone(),
            media: media.clone(),
            resolver: Arc::new(resolver),
            notifier: notifier.clone(),
        };
        let analyzers = AnalyzerChain::new(vec![Arc::new(KeywordAnalyzer::new())]);
        Self {
            pipeline: Pipeline::new(ports, analyzers, config),
            store,
            assets,
            media,
            notifier,
        }
    }

    pub fn unresolvable() -> Self {
        Self::build(StaticResolver::unavailable(), RecordingMediaJobs::new(), PipelineConfig::default())
    }

    pub fn direct(url: &str, duration: Option<f64>) -> Self {
        Self::build(StaticResolver::direct(url, duration), RecordingMediaJobs::new(), PipelineConfig::default())
    }

    pub fn signed(secret: &str) -> Self {
        let config = PipelineConfig {
            webhook_signing_secret: Some(secret.to_string()),
            ..Default::default()
        };
        Self::build(StaticResolver::unavailable(), RecordingMediaJobs::new(), config)
    }

    pub fn with_media(media: RecordingMediaJobs) -> Self {
        Self::build(StaticResolver::unavailable(), media, PipelineConfig::default())
    }

    /// Pipeline over a store whose `fail_on`-th `list_clips` call errors.
    pub fn flaky(resolver: StaticResolver, fail_on: usize) -> Self {
        let store = Arc::new(MemoryJobStore::new());
        let port = Arc::new(FlakyJobStore {
            inner: store.clone(),
            list_calls: AtomicUsize::new(0),
            fail_on,
        });
        Self::build_with_port(store, port, resolver, RecordingMediaJobs::new(), PipelineConfig::default())
    }

    pub async fn seed_job(&self, status: JobStatus) -> Job {
        let mut job = Job::new("user-1", "https://video.test/watch?v=1", GenerationContext::default());
        job.status = status;
        self.store.create_job(&job).await.unwrap();
        job
    }

    pub async fn seed_clip(&self, job: &Job, status: ClipStatus, asset_url: Option<&str>) -> Clip {
        let moment = Moment {
            start_time: 10.0,
            end_time: 40.0,
            moment_type: MomentType::Hook,
            scores: MomentScores::clamped(90.0, 80.0, 70.0, 85.0),
            why_selected: "seeded".to_string(),
            suggested_caption: "seeded".to_string(),
            transcript_excerpt: "seeded".to_string(),
        };
        let mut clip = Clip::from_moment(&job.id, &moment);
        clip.status = status;
        clip.asset_url = asset_url.map(str::to_string);
        self.store.create_clip(&clip).await.unwrap();
        clip
    }

    pub async fn job(&self, id: &JobId) -> Job {
        self.store.get_job(id).await.unwrap().unwrap()
    }

    pub async fn clip(&self, job_id: &JobId, clip_id: &ClipId) -> Clip {
        self.store.get_clip(job_id, clip_id).await.unwrap().unwrap()
    }

    pub async fn clips(&self, job_id: &JobId) -> Vec<Clip> {
        self.store.list_clips(job_id).await.unwrap()
    }
}
