//! End-to-end pipeline scenarios over the in-memory ports.

use std::sync::Arc;

use serde_json::{json, Value};

use mclip_models::{ClipStatus, Continuation, GenerationContext, Job, JobStatus};
use mclip_pipeline::analyzer::{AnalyzerChain, KeywordAnalyzer};
use mclip_pipeline::memory::{
    MediaKind, MemoryAssetStore, MemoryJobStore, RecordingMediaJobs, RecordingNotifier,
    StaticResolver,
};
use mclip_pipeline::transcript::{parse_transcript, TranscriptInput};
use mclip_pipeline::{
    JobStore, JobSubmission, Pipeline, PipelineConfig, Ports, WebhookEvent, WebhookQuery,
};

/// Five blocks a minute apart, each hitting exactly one cue category.
const FIVE_CATEGORY_SRT: &str = "\
1
00:00:00,000 --> 00:00:05,000
Did you know this trick exists?

2
00:01:00,000 --> 00:01:05,000
Honestly it worked for our team.

3
00:02:00,000 --> 00:02:05,000
Click the button below.

4
00:03:00,000 --> 00:03:05,000
Trusted by teams worldwide.

5
00:04:00,000 --> 00:04:05,000
Hurry because stock is low.
";

struct World {
    pipeline: Pipeline,
    store: Arc<MemoryJobStore>,
    assets: Arc<MemoryAssetStore>,
    media: Arc<RecordingMediaJobs>,
    notifier: Arc<RecordingNotifier>,
}

impl World {
    fn new(resolver: StaticResolver) -> Self {
        let store = Arc::new(MemoryJobStore::new());
        let assets = Arc::new(MemoryAssetStore::default());
        let media = Arc::new(RecordingMediaJobs::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let ports = Ports {
            store: store.clone(),
            assets: assets.clone(),
            media: media.clone(),
            resolver: Arc::new(resolver),
            notifier: notifier.clone(),
        };
        let analyzers = AnalyzerChain::new(vec![Arc::new(KeywordAnalyzer::new())]);
        Self {
            pipeline: Pipeline::new(ports, analyzers, PipelineConfig::default()),
            store,
            assets,
            media,
            notifier,
        }
    }

    fn direct() -> Self {
        Self::new(StaticResolver::direct("https://cdn.test/source.mp4", Some(300.0)))
    }

    async fn submit(&self, max_clips: u32) -> Job {
        let context = GenerationContext {
            industry: "software".to_string(),
            product_description: "Team scheduling tool".to_string(),
            target_audience: "Operations leads".to_string(),
            target_clip_duration: 30.0,
            max_clips,
        };
        self.pipeline
            .submit_job(
                "user-1",
                JobSubmission {
                    source_url: "https://video.test/watch?v=launch".to_string(),
                    video_duration: None,
                    context,
                },
            )
            .await
            .unwrap()
    }

    async fn deliver(&self, cont: &Continuation, status: &str, output: Value) -> bool {
        let query = WebhookQuery {
            job_id: Some(cont.job_id.to_string()),
            step: Some(cont.step.as_str().to_string()),
            clip_id: cont.clip_id.as_ref().map(|c| c.to_string()),
            sig: None,
        };
        let event = WebhookEvent {
            id: Some("pred".to_string()),
            status: Some(status.to_string()),
            output: Some(output),
            error: (status == "failed").then(|| json!("encoder crashed")),
        };
        self.pipeline.handle_webhook(&query, &event).await.unwrap().handled
    }

    async fn transcribe(&self, job: &Job, srt: &str) {
        assert!(self.deliver(&Continuation::transcribe(&job.id), "succeeded", json!(srt)).await);
    }

    /// Serve a render output and deliver its success webhook.
    async fn render_ok(&self, cont: &Continuation, n: usize) {
        let url = format!("https://replicate.test/render-{}.mp4", n);
        self.assets.serve(url.clone(), vec![0u8; 64]).await;
        assert!(self.deliver(cont, "succeeded", json!(url)).await);
    }

    async fn thumbnail_ok(&self, cont: &Continuation, n: usize) -> bool {
        let url = format!("https://replicate.test/thumb-{}.jpg", n);
        self.assets.serve(url.clone(), vec![1u8; 16]).await;
        self.deliver(cont, "succeeded", json!([url])).await
    }

    async fn job(&self, job: &Job) -> Job {
        self.store.get_job(&job.id).await.unwrap().unwrap()
    }
}

#[test]
fn scenario_a_malformed_block_is_skipped() {
    let srt = "\
1
00:00:01,000 --> 00:00:04,000
First line.

2
00:00:05,000 --> 00:00:08,500
Second line.

3
00:00:09,000 -> nonsense
Broken block.

4
00:00:10,000 --> 00:00:12,000
Third line.
";
    let segments = parse_transcript(&TranscriptInput::Text(srt.to_string()));
    assert_eq!(segments.len(), 3);
    assert_eq!(segments[2].text, "Third line.");
    assert!(segments.iter().all(|s| s.end > s.start));
}

#[tokio::test]
async fn scenario_b_heuristic_respects_cap_and_length_band() {
    let world = World::direct();
    let job = world.submit(2).await;
    world.transcribe(&job, FIVE_CATEGORY_SRT).await;

    let clips = world.store.list_clips(&job.id).await.unwrap();
    assert_eq!(clips.len(), 2);
    for clip in &clips {
        let length = clip.end_time - clip.start_time;
        assert!((21.0..=39.0).contains(&length), "clip length {}", length);
        assert_eq!(clip.status, ClipStatus::Processing);
    }
    assert_eq!(world.media.requests_of(MediaKind::Trim).await.len(), 2);
    assert_eq!(world.job(&job).await.status, JobStatus::Clipping);
}

#[tokio::test]
async fn scenario_c_failed_render_still_completes_job() {
    let world = World::direct();
    let job = world.submit(2).await;
    world.transcribe(&job, FIVE_CATEGORY_SRT).await;

    let trims = world.media.requests_of(MediaKind::Trim).await;
    assert_eq!(trims.len(), 2);

    // Clip X fails
    let failed = &trims[0].continuation;
    assert!(world.deliver(failed, "failed", Value::Null).await);
    let failed_id = failed.clip_id.clone().unwrap();
    let clip_x = world.store.get_clip(&job.id, &failed_id).await.unwrap().unwrap();
    assert_eq!(clip_x.status, ClipStatus::Failed);
    assert_eq!(clip_x.error_message.as_deref(), Some("encoder crashed"));
    assert_eq!(world.job(&job).await.status, JobStatus::Clipping);

    // The other clip renders and gets its thumbnail
    world.render_ok(&trims[1].continuation, 1).await;
    let thumbs = world.media.requests_of(MediaKind::Thumbnail).await;
    assert_eq!(thumbs.len(), 1);
    assert!(world.thumbnail_ok(&thumbs[0].continuation, 1).await);

    let done = world.job(&job).await;
    assert_eq!(done.status, JobStatus::Completed);
    let sent = world.notifier.notifications().await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].message.starts_with("1 of 2"));
}

#[tokio::test]
async fn scenario_d_unresolvable_source_completes_without_renders() {
    let world = World::new(StaticResolver::unavailable());
    let job = world.submit(3).await;
    world.transcribe(&job, FIVE_CATEGORY_SRT).await;

    let clips = world.store.list_clips(&job.id).await.unwrap();
    assert!(!clips.is_empty());
    assert!(clips
        .iter()
        .all(|c| c.status == ClipStatus::Completed && c.asset_url.is_none()));
    assert!(world.media.requests_of(MediaKind::Trim).await.is_empty());

    assert_eq!(world.job(&job).await.status, JobStatus::Completed);
    assert_eq!(world.notifier.notifications().await.len(), 1);
}

#[tokio::test]
async fn scenario_e_concurrent_last_thumbnails_notify_once() {
    let world = World::direct();
    let job = world.submit(3).await;
    world.transcribe(&job, FIVE_CATEGORY_SRT).await;

    let trims = world.media.requests_of(MediaKind::Trim).await;
    assert_eq!(trims.len(), 3);
    for (n, trim) in trims.iter().enumerate() {
        world.render_ok(&trim.continuation, n).await;
    }
    let thumbs = world.media.requests_of(MediaKind::Thumbnail).await;
    assert_eq!(thumbs.len(), 3);
    assert!(world.thumbnail_ok(&thumbs[0].continuation, 0).await);
    assert_eq!(world.job(&job).await.status, JobStatus::Clipping);

    let (a, b) = tokio::join!(
        world.thumbnail_ok(&thumbs[1].continuation, 1),
        world.thumbnail_ok(&thumbs[2].continuation, 2),
    );
    assert!(a && b);

    assert_eq!(world.job(&job).await.status, JobStatus::Completed);
    let sent = world.notifier.notifications().await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].message.starts_with("3 of 3"));

    // A redelivered thumbnail webhook changes nothing
    world.thumbnail_ok(&thumbs[2].continuation, 2).await;
    assert_eq!(world.notifier.notifications().await.len(), 1);
}
