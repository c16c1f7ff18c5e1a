//! Production port implementations.
//!
//! Thin wrappers binding the pipeline ports to Firestore, R2, the prediction
//! service, the resolver and Redis.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use mclip_events::EventPublisher;
use mclip_firestore::{ClipRepository, FirestoreClient, JobRepository, NotificationRepository};
use mclip_models::timestamp::format_seconds;
use mclip_models::{Clip, ClipId, ClipPatch, Continuation, Job, JobId, JobPatch, Notification};
use mclip_services::{AwaitStrategy, PredictionClient, ResolvedSource, SourceResolverClient};
use mclip_storage::R2Client;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::ports::{AssetStore, JobStore, MediaJobs, Notifier, SourceResolver};

/// Bound on downloading a temporary service output.
const FETCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Jobs in `clip_jobs`, clips in their sub-collection.
#[derive(Clone)]
pub struct FirestoreJobStore {
    jobs: JobRepository,
    clips: ClipRepository,
}

impl FirestoreJobStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self {
            jobs: JobRepository::new(client.clone()),
            clips: ClipRepository::new(client),
        }
    }
}

#[async_trait]
impl JobStore for FirestoreJobStore {
    async fn create_job(&self, job: &Job) -> PipelineResult<()> {
        Ok(self.jobs.create(job).await?)
    }

    async fn get_job(&self, job_id: &JobId) -> PipelineResult<Option<Job>> {
        Ok(self.jobs.get(job_id).await?)
    }

    async fn apply_job_patch(&self, job_id: &JobId, patch: &JobPatch) -> PipelineResult<Option<Job>> {
        Ok(self.jobs.apply_patch(job_id, patch).await?)
    }

    async fn create_clip(&self, clip: &Clip) -> PipelineResult<()> {
        Ok(self.clips.create(clip).await?)
    }

    async fn get_clip(&self, job_id: &JobId, clip_id: &ClipId) -> PipelineResult<Option<Clip>> {
        Ok(self.clips.get(job_id, clip_id).await?)
    }

    async fn list_clips(&self, job_id: &JobId) -> PipelineResult<Vec<Clip>> {
        Ok(self.clips.list(job_id).await?)
    }

    async fn apply_clip_patch(
        &self,
        job_id: &JobId,
        clip_id: &ClipId,
        patch: &ClipPatch,
    ) -> PipelineResult<Option<Clip>> {
        Ok(self.clips.apply_patch(job_id, clip_id, patch).await?)
    }
}

/// R2 for durable objects, plain HTTP for temporary outputs.
#[derive(Clone)]
pub struct R2AssetStore {
    r2: R2Client,
    http: Client,
}

impl R2AssetStore {
    pub fn new(r2: R2Client) -> PipelineResult<Self> {
        let http = Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self { r2, http })
    }
}

/// GET `url` and return the body, failing on non-2xx.
async fn fetch_bytes(http: &Client, url: &str) -> PipelineResult<Vec<u8>> {
    let response = http.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(PipelineError::asset(format!("GET {} returned {}", url, status)));
    }
    let bytes = response.bytes().await?;
    debug!("Fetched {} bytes from {}", bytes.len(), url);
    Ok(bytes.to_vec())
}

#[async_trait]
impl AssetStore for R2AssetStore {
    async fn fetch(&self, url: &str) -> PipelineResult<Vec<u8>> {
        fetch_bytes(&self.http, url).await
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> PipelineResult<String> {
        self.r2.upload_bytes(bytes, key, content_type).await?;
        Ok(self.r2.public_url(key))
    }
}

/// Prediction service with webhook callbacks.
#[derive(Clone)]
pub struct PredictionMediaJobs {
    client: PredictionClient,
    config: Arc<PipelineConfig>,
}

impl PredictionMediaJobs {
    pub fn new(client: PredictionClient, config: PipelineConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    fn strategy(&self, continuation: &Continuation) -> PipelineResult<AwaitStrategy> {
        let url = continuation.callback_url(
            &self.config.webhook_url(),
            self.config.webhook_signing_secret.as_deref(),
        )?;
        Ok(AwaitStrategy::callback(url))
    }
}

#[async_trait]
impl MediaJobs for PredictionMediaJobs {
    fn is_configured(&self) -> bool {
        self.client.is_configured()
    }

    async fn start_transcription(
        &self,
        source_url: &str,
        continuation: &Continuation,
    ) -> PipelineResult<String> {
        let strategy = self.strategy(continuation)?;
        let prediction = self.client.create_transcription(source_url, &strategy).await?;
        Ok(prediction.id)
    }

    async fn start_trim(
        &self,
        video_url: &str,
        start_secs: f64,
        end_secs: f64,
        continuation: &Continuation,
    ) -> PipelineResult<String> {
        let strategy = self.strategy(continuation)?;
        let prediction = self
            .client
            .create_trim(
                video_url,
                &format_seconds(start_secs),
                &format_seconds(end_secs),
                &strategy,
            )
            .await?;
        Ok(prediction.id)
    }

    async fn start_thumbnail(
        &self,
        video_url: &str,
        at_secs: f64,
        continuation: &Continuation,
    ) -> PipelineResult<String> {
        let strategy = self.strategy(continuation)?;
        let prediction = self
            .client
            .create_thumbnail(video_url, &format_seconds(at_secs), &strategy)
            .await?;
        Ok(prediction.id)
    }
}

/// Resolver service, short-circuiting sources we host ourselves.
#[derive(Clone)]
pub struct ResolverSource {
    client: SourceResolverClient,
    /// Public URL prefix of uploaded objects
    upload_prefix: Option<String>,
}

impl ResolverSource {
    pub fn new(client: SourceResolverClient, upload_prefix: Option<String>) -> Self {
        Self {
            client,
            upload_prefix,
        }
    }

    fn hosted(&self, source_url: &str) -> bool {
        self.upload_prefix
            .as_deref()
            .is_some_and(|prefix| !prefix.is_empty() && source_url.starts_with(prefix))
    }
}

#[async_trait]
impl SourceResolver for ResolverSource {
    async fn resolve(&self, source_url: &str) -> Option<ResolvedSource> {
        if self.hosted(source_url) {
            return Some(ResolvedSource {
                id: None,
                title: None,
                url: Some(source_url.to_string()),
                ext: None,
                filesize: None,
                duration: None,
            });
        }
        self.client.resolve(source_url).await
    }
}

/// Record and unread counter in one Firestore commit, then a best-effort
/// Redis publish.
#[derive(Clone)]
pub struct FirestoreNotifier {
    notifications: NotificationRepository,
    events: Option<EventPublisher>,
}

impl FirestoreNotifier {
    pub fn new(client: FirestoreClient, events: Option<EventPublisher>) -> Self {
        Self {
            notifications: NotificationRepository::new(client),
            events,
        }
    }
}

#[async_trait]
impl Notifier for FirestoreNotifier {
    async fn notify(&self, notification: &Notification) -> PipelineResult<()> {
        self.notifications.record(notification).await?;

        if let Some(events) = &self.events {
            if let Err(e) = events.publish_notification(notification).await {
                warn!(
                    user_id = %notification.user_id,
                    notification_id = %notification.id,
                    "Real-time publish failed, notification remains stored: {}",
                    e
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mclip_services::{MediaApiConfig, ResolverConfig};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn media(base_url: String, secret: Option<&str>) -> PredictionMediaJobs {
        let client = PredictionClient::new(MediaApiConfig {
            base_url,
            token: Some("tok".to_string()),
            ..Default::default()
        })
        .unwrap();
        PredictionMediaJobs::new(
            client,
            PipelineConfig {
                public_base_url: "https://api.test".to_string(),
                webhook_signing_secret: secret.map(str::to_string),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_trim_registers_signed_callback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/predictions"))
            .and(header("authorization", "Bearer tok"))
            .and(body_partial_json(json!({
                "input": {"start_time": "00:00:05.000", "end_time": "00:00:35.500", "output_format": "mp4"},
                "webhook_events_filter": ["completed"]
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "p-9", "status": "starting"})))
            .expect(1)
            .mount(&server)
            .await;

        let jobs = media(server.uri(), Some("k"));
        let cont = Continuation::clip(&JobId::from_string("j1"), &ClipId::from_string("c1"));
        let id = jobs.start_trim("https://cdn/v.mp4", 5.0, 35.5, &cont).await.unwrap();
        assert_eq!(id, "p-9");

        let requests: Vec<Request> = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let webhook = body["webhook"].as_str().unwrap();
        assert!(webhook.starts_with("https://api.test/api/webhooks/media?"));
        assert!(webhook.contains("jobId=j1"));
        assert!(webhook.contains("step=clip"));
        assert!(webhook.contains("clipId=c1"));
        assert!(webhook.contains(&format!("sig={}", cont.sign("k").unwrap())));
    }

    #[tokio::test]
    async fn test_transcription_error_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/predictions"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad version"))
            .mount(&server)
            .await;

        let jobs = media(server.uri(), None);
        let err = jobs
            .start_transcription("https://x/a.mp4", &Continuation::transcribe(&JobId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Service(_)));
    }

    #[tokio::test]
    async fn test_hosted_uploads_skip_resolver() {
        let client = SourceResolverClient::new(ResolverConfig::default()).unwrap();
        let resolver = ResolverSource::new(client, Some("https://media.test/".to_string()));

        let hosted = resolver.resolve("https://media.test/uploads/u1/a.mp4").await.unwrap();
        assert_eq!(hosted.url.as_deref(), Some("https://media.test/uploads/u1/a.mp4"));
        // Unconfigured resolver degrades for everything else.
        assert!(resolver.resolve("https://video.site/watch?v=1").await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_bytes_checks_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/out.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/expired.mp4"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let http = Client::new();
        let bytes = fetch_bytes(&http, &format!("{}/out.mp4", server.uri())).await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        let err = fetch_bytes(&http, &format!("{}/expired.mp4", server.uri())).await;
        assert!(matches!(err, Err(PipelineError::Asset(_))));
    }
}
