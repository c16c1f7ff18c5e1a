//! In-process port implementations.
//!
//! Used by the scenario tests and for running the pipeline without cloud
//! credentials. Conditional writes are a check-and-set under one mutex, so
//! they give the same at-most-once guarantees as the Firestore store.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use mclip_models::{Clip, ClipId, ClipPatch, Continuation, Job, JobId, JobPatch, Notification};
use mclip_services::ResolvedSource;

use crate::error::{PipelineError, PipelineResult};
use crate::ports::{AssetStore, JobStore, MediaJobs, Notifier, SourceResolver};

/// Job and clip records behind a mutex.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
    clips: Mutex<HashMap<JobId, Vec<Clip>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, job: &Job) -> PipelineResult<()> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job.id) {
            return Err(PipelineError::store(format!("job {} already exists", job.id)));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, job_id: &JobId) -> PipelineResult<Option<Job>> {
        Ok(self.jobs.lock().await.get(job_id).cloned())
    }

    async fn apply_job_patch(&self, job_id: &JobId, patch: &JobPatch) -> PipelineResult<Option<Job>> {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.get_mut(job_id) else {
            return Err(PipelineError::job_not_found(job_id.as_str()));
        };
        if !patch.admits(job) {
            return Ok(None);
        }
        patch.apply(job, Utc::now());
        Ok(Some(job.clone()))
    }

    async fn create_clip(&self, clip: &Clip) -> PipelineResult<()> {
        let mut clips = self.clips.lock().await;
        let siblings = clips.entry(clip.job_id.clone()).or_default();
        if siblings.iter().any(|c| c.id == clip.id) {
            return Err(PipelineError::store(format!("clip {} already exists", clip.id)));
        }
        siblings.push(clip.clone());
        Ok(())
    }

    async fn get_clip(&self, job_id: &JobId, clip_id: &ClipId) -> PipelineResult<Option<Clip>> {
        Ok(self
            .clips
            .lock()
            .await
            .get(job_id)
            .and_then(|clips| clips.iter().find(|c| &c.id == clip_id))
            .cloned())
    }

    async fn list_clips(&self, job_id: &JobId) -> PipelineResult<Vec<Clip>> {
        let mut clips = self.clips.lock().await.get(job_id).cloned().unwrap_or_default();
        clips.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        Ok(clips)
    }

    async fn apply_clip_patch(
        &self,
        job_id: &JobId,
        clip_id: &ClipId,
        patch: &ClipPatch,
    ) -> PipelineResult<Option<Clip>> {
        let mut clips = self.clips.lock().await;
        let Some(clip) = clips
            .get_mut(job_id)
            .and_then(|clips| clips.iter_mut().find(|c| &c.id == clip_id))
        else {
            return Err(PipelineError::clip_not_found(clip_id.as_str()));
        };
        if !patch.admits(clip) {
            return Ok(None);
        }
        patch.apply(clip, Utc::now());
        Ok(Some(clip.clone()))
    }
}

/// Stored object.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Object store with a set of fetchable "remote" URLs.
pub struct MemoryAssetStore {
    public_base: String,
    remote: Mutex<HashMap<String, Vec<u8>>>,
    objects: Mutex<HashMap<String, StoredObject>>,
    failing_prefixes: Mutex<HashSet<String>>,
}

impl Default for MemoryAssetStore {
    fn default() -> Self {
        Self::new("https://assets.test")
    }
}

impl MemoryAssetStore {
    pub fn new(public_base: impl Into<String>) -> Self {
        Self {
            public_base: public_base.into(),
            remote: Mutex::new(HashMap::new()),
            objects: Mutex::new(HashMap::new()),
            failing_prefixes: Mutex::new(HashSet::new()),
        }
    }

    /// Make `url` fetchable with the given body.
    pub async fn serve(&self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.remote.lock().await.insert(url.into(), bytes.into());
    }

    /// Reject puts for keys starting with `prefix`.
    pub async fn fail_puts_under(&self, prefix: impl Into<String>) {
        self.failing_prefixes.lock().await.insert(prefix.into());
    }

    pub async fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().await.get(key).cloned()
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn fetch(&self, url: &str) -> PipelineResult<Vec<u8>> {
        self.remote
            .lock()
            .await
            .get(url)
            .cloned()
            .ok_or_else(|| PipelineError::asset(format!("GET {} returned 404", url)))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> PipelineResult<String> {
        let rejected = self
            .failing_prefixes
            .lock()
            .await
            .iter()
            .any(|prefix| key.starts_with(prefix.as_str()));
        if rejected {
            return Err(PipelineError::asset(format!("put {} rejected", key)));
        }
        self.objects.lock().await.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(format!("{}/{}", self.public_base, key))
    }
}

/// Kind of external job requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Transcription,
    Trim,
    Thumbnail,
}

/// One recorded external job request.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRequest {
    pub kind: MediaKind,
    pub external_id: String,
    pub url: String,
    /// `(start, end)` for trims, `(at, at)` for thumbnails
    pub range: Option<(f64, f64)>,
    pub continuation: Continuation,
}

/// Records every request instead of calling a service.
pub struct RecordingMediaJobs {
    configured: bool,
    failing: Mutex<HashSet<MediaKind>>,
    requests: Mutex<Vec<MediaRequest>>,
}

impl Default for RecordingMediaJobs {
    fn default() -> Self {
        Self {
            configured: true,
            failing: Mutex::new(HashSet::new()),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl RecordingMediaJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// A media backend without credentials.
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::default()
        }
    }

    /// Make every subsequent request of `kind` fail.
    pub async fn fail(&self, kind: MediaKind) {
        self.failing.lock().await.insert(kind);
    }

    pub async fn requests(&self) -> Vec<MediaRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn requests_of(&self, kind: MediaKind) -> Vec<MediaRequest> {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }

    async fn record(
        &self,
        kind: MediaKind,
        url: &str,
        range: Option<(f64, f64)>,
        continuation: &Continuation,
    ) -> PipelineResult<String> {
        if self.failing.lock().await.contains(&kind) {
            return Err(PipelineError::media_failed(format!("{:?} request rejected", kind)));
        }
        let mut requests = self.requests.lock().await;
        let external_id = format!("ext-{}", requests.len() + 1);
        requests.push(MediaRequest {
            kind,
            external_id: external_id.clone(),
            url: url.to_string(),
            range,
            continuation: continuation.clone(),
        });
        Ok(external_id)
    }
}

#[async_trait]
impl MediaJobs for RecordingMediaJobs {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn start_transcription(
        &self,
        source_url: &str,
        continuation: &Continuation,
    ) -> PipelineResult<String> {
        self.record(MediaKind::Transcription, source_url, None, continuation).await
    }

    async fn start_trim(
        &self,
        video_url: &str,
        start_secs: f64,
        end_secs: f64,
        continuation: &Continuation,
    ) -> PipelineResult<String> {
        self.record(MediaKind::Trim, video_url, Some((start_secs, end_secs)), continuation)
            .await
    }

    async fn start_thumbnail(
        &self,
        video_url: &str,
        at_secs: f64,
        continuation: &Continuation,
    ) -> PipelineResult<String> {
        self.record(MediaKind::Thumbnail, video_url, Some((at_secs, at_secs)), continuation)
            .await
    }
}

/// Collects notifications.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> PipelineResult<()> {
        self.sent.lock().await.push(notification.clone());
        Ok(())
    }
}

/// Resolver returning a fixed answer.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    answer: Option<ResolvedSource>,
}

impl StaticResolver {
    /// Every source is unresolvable.
    pub fn unavailable() -> Self {
        Self { answer: None }
    }

    /// Every source resolves to `url`.
    pub fn direct(url: impl Into<String>, duration: Option<f64>) -> Self {
        Self {
            answer: Some(ResolvedSource {
                id: None,
                title: None,
                url: Some(url.into()),
                ext: Some("mp4".to_string()),
                filesize: None,
                duration,
            }),
        }
    }
}

#[async_trait]
impl SourceResolver for StaticResolver {
    async fn resolve(&self, _source_url: &str) -> Option<ResolvedSource> {
        self.answer.clone()
    }
}
