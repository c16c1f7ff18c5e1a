//! Clip lifecycle.
//!
//! ```text
//! PENDING ──► PROCESSING ──► COMPLETED
//!    │             │
//!    └─► COMPLETED └─► FAILED
//!    └─► FAILED
//! ```
//!
//! A clip is marked PROCESSING before its render is requested so the render
//! webhook can never observe a PENDING clip. Each clip fails on its own;
//! siblings are unaffected.

use std::collections::HashMap;

use mclip_models::{
    Clip, ClipGuard, ClipId, ClipPatch, ClipStatus, Continuation, Job, JobId, Moment,
};

use crate::error::PipelineResult;
use crate::logging::JobLogger;
use crate::metrics::record_clip_terminal;
use crate::Pipeline;

/// Progress recorded once a render has been requested.
const RENDER_REQUESTED_PROGRESS: u8 = 10;

/// Progress recorded once the rendered asset is persisted.
const ASSET_STORED_PROGRESS: u8 = 80;

const CLIP_CONTENT_TYPE: &str = "video/mp4";
const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";

impl Pipeline {
    /// Ensure one clip per moment exists, then move every PENDING clip on:
    /// request its render (`direct_url` known) or complete it as metadata
    /// only.
    ///
    /// Safe to repeat. Clip ids are derived from the moment index, so a
    /// second pass only creates what is missing and only advances clips
    /// still PENDING. Returns how many clips this pass advanced.
    pub(crate) async fn create_clips(
        &self,
        job: &Job,
        moments: &[Moment],
        direct_url: Option<&str>,
    ) -> PipelineResult<usize> {
        let logger = JobLogger::new(&job.id, "clip");
        let store = &self.ports.store;

        let mut existing: HashMap<ClipId, Clip> = store
            .list_clips(&job.id)
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        let mut clips = Vec::with_capacity(moments.len());
        let mut created = 0;
        for (index, moment) in moments.iter().enumerate() {
            let id = ClipId::for_moment(&job.id, index);
            let clip = match existing.remove(&id) {
                Some(clip) => clip,
                None => {
                    let clip = Clip {
                        id,
                        ..Clip::from_moment(&job.id, moment)
                    };
                    store.create_clip(&clip).await?;
                    created += 1;
                    clip
                }
            };
            clips.push(clip);
        }
        if created > 0 {
            logger.log_progress(&format!("Created {} of {} clips", created, moments.len()));
        }

        let mut advanced = 0;
        for clip in clips.iter().filter(|c| c.status == ClipStatus::Pending) {
            let moved = match direct_url {
                Some(url) => self.request_render(job, clip, url).await?,
                None => self.complete_without_render(&job.id, clip).await?,
            };
            if moved {
                advanced += 1;
            }
        }
        Ok(advanced)
    }

    async fn request_render(&self, job: &Job, clip: &Clip, video_url: &str) -> PipelineResult<bool> {
        let logger = JobLogger::new(&job.id, "clip").for_clip(&clip.id);
        let store = &self.ports.store;

        let processing = ClipPatch::when(ClipGuard::Status(ClipStatus::Pending))
            .status(ClipStatus::Processing)
            .progress(RENDER_REQUESTED_PROGRESS);
        if store.apply_clip_patch(&job.id, &clip.id, &processing).await?.is_none() {
            return Ok(false);
        }

        let continuation = Continuation::clip(&job.id, &clip.id);
        match self
            .ports
            .media
            .start_trim(video_url, clip.start_time, clip.end_time, &continuation)
            .await
        {
            Ok(render_id) => {
                logger.log_progress(&format!("Render requested ({})", render_id));
                let patch = ClipPatch::when(ClipGuard::NonTerminal).render_id(render_id);
                store.apply_clip_patch(&job.id, &clip.id, &patch).await?;
            }
            Err(e) => {
                logger.log_warning(&format!("Render request failed: {}", e));
                self.fail_clip(&job.id, clip, format!("Failed to start render: {}", e))
                    .await?;
            }
        }
        Ok(true)
    }

    async fn complete_without_render(&self, job_id: &JobId, clip: &Clip) -> PipelineResult<bool> {
        let patch = ClipPatch::when(ClipGuard::Status(ClipStatus::Pending))
            .status(ClipStatus::Completed)
            .progress(100);
        let completed = self
            .ports
            .store
            .apply_clip_patch(job_id, &clip.id, &patch)
            .await?
            .is_some();
        if completed {
            record_clip_terminal("completed");
        }
        Ok(completed)
    }

    /// Move a non-terminal clip to FAILED.
    pub(crate) async fn fail_clip(
        &self,
        job_id: &JobId,
        clip: &Clip,
        error: String,
    ) -> PipelineResult<bool> {
        let patch = ClipPatch::when(ClipGuard::NonTerminal)
            .status(ClipStatus::Failed)
            .error(error);
        let failed = self
            .ports
            .store
            .apply_clip_patch(job_id, &clip.id, &patch)
            .await?
            .is_some();
        if failed {
            record_clip_terminal("failed");
        }
        Ok(failed)
    }

    /// Render finished: persist the asset, then request the thumbnail.
    pub(crate) async fn on_render_succeeded(
        &self,
        job_id: &JobId,
        clip: &Clip,
        output_url: Option<String>,
    ) -> PipelineResult<bool> {
        let logger = JobLogger::new(job_id, "clip").for_clip(&clip.id);
        if ClipGuard::AwaitingThumbnail.admits(clip) {
            // Asset stored earlier but the thumbnail request may never have gone out.
            logger.log_progress("Render result redelivered, re-requesting thumbnail");
            let asset_url = clip.asset_url.clone().unwrap_or_default();
            self.request_thumbnail(job_id, clip, &asset_url).await?;
            return Ok(true);
        }
        if !ClipGuard::AwaitingRender.admits(clip) {
            logger.log_progress(&format!("Ignoring render result for {} clip", clip.status));
            return Ok(false);
        }

        let Some(output_url) = output_url else {
            logger.log_warning("Render succeeded without an output URL");
            return self
                .fail_clip(job_id, clip, "Render completed without output".to_string())
                .await;
        };

        let (public_url, size_bytes) = match self
            .persist_asset(&output_url, &clip.asset_key(), CLIP_CONTENT_TYPE)
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                logger.log_error(&format!("Failed to persist rendered clip: {}", e));
                return self
                    .fail_clip(job_id, clip, format!("Failed to persist rendered clip: {}", e))
                    .await;
            }
        };

        let stored = ClipPatch::when(ClipGuard::AwaitingRender)
            .asset(&public_url, size_bytes)
            .progress(ASSET_STORED_PROGRESS);
        if self
            .ports
            .store
            .apply_clip_patch(job_id, &clip.id, &stored)
            .await?
            .is_none()
        {
            return Ok(false);
        }
        logger.log_progress(&format!("Stored clip asset ({} bytes)", size_bytes));

        self.request_thumbnail(job_id, clip, &public_url).await?;
        Ok(true)
    }

    /// Ask for a thumbnail of the stored asset. If the request itself fails
    /// the clip completes without one.
    async fn request_thumbnail(&self, job_id: &JobId, clip: &Clip, asset_url: &str) -> PipelineResult<()> {
        let logger = JobLogger::new(job_id, "clip").for_clip(&clip.id);
        let at = self.config.thumbnail_offset(clip.duration);
        let continuation = Continuation::thumbnail(job_id, &clip.id);
        match self
            .ports
            .media
            .start_thumbnail(asset_url, at, &continuation)
            .await
        {
            Ok(thumbnail_id) => {
                logger.log_progress(&format!("Thumbnail requested ({})", thumbnail_id));
            }
            Err(e) => {
                logger.log_warning(&format!("Thumbnail request failed, completing without one: {}", e));
                self.complete_clip(job_id, clip, None).await?;
            }
        }
        Ok(())
    }

    /// Render failed or was canceled. No retry.
    pub(crate) async fn on_render_failed(
        &self,
        job_id: &JobId,
        clip: &Clip,
        error: Option<String>,
    ) -> PipelineResult<bool> {
        let logger = JobLogger::new(job_id, "clip").for_clip(&clip.id);
        if !ClipGuard::AwaitingRender.admits(clip) {
            logger.log_progress(&format!("Ignoring render failure for {} clip", clip.status));
            return Ok(false);
        }
        let message = error.unwrap_or_else(|| "Render failed".to_string());
        logger.log_warning(&format!("Render failed: {}", message));
        self.fail_clip(job_id, clip, message).await
    }

    /// Thumbnail finished either way: keep the frame if we can, then
    /// complete the clip.
    pub(crate) async fn on_thumbnail(
        &self,
        job_id: &JobId,
        clip: &Clip,
        output_url: Option<String>,
    ) -> PipelineResult<bool> {
        let logger = JobLogger::new(job_id, "thumbnail").for_clip(&clip.id);
        if !ClipGuard::AwaitingThumbnail.admits(clip) {
            logger.log_progress(&format!("Ignoring thumbnail result for {} clip", clip.status));
            return Ok(false);
        }

        let thumbnail_url = match output_url {
            Some(url) => match self
                .persist_asset(&url, &clip.thumbnail_key(), THUMBNAIL_CONTENT_TYPE)
                .await
            {
                Ok((public_url, _)) => Some(public_url),
                Err(e) => {
                    logger.log_warning(&format!("Thumbnail not stored: {}", e));
                    None
                }
            },
            None => {
                logger.log_warning("Thumbnail finished without output");
                None
            }
        };

        self.complete_clip(job_id, clip, thumbnail_url).await
    }

    async fn complete_clip(
        &self,
        job_id: &JobId,
        clip: &Clip,
        thumbnail_url: Option<String>,
    ) -> PipelineResult<bool> {
        let mut patch = ClipPatch::when(ClipGuard::AwaitingThumbnail)
            .status(ClipStatus::Completed)
            .progress(100);
        if let Some(url) = thumbnail_url {
            patch = patch.thumbnail(url);
        }
        let completed = self
            .ports
            .store
            .apply_clip_patch(job_id, &clip.id, &patch)
            .await?
            .is_some();
        if completed {
            record_clip_terminal("completed");
        }
        Ok(completed)
    }

    /// Copy a temporary output into durable storage.
    async fn persist_asset(
        &self,
        source_url: &str,
        key: &str,
        content_type: &str,
    ) -> PipelineResult<(String, u64)> {
        let bytes = self.ports.assets.fetch(source_url).await?;
        let size = bytes.len() as u64;
        let url = self.ports.assets.put(key, bytes, content_type).await?;
        Ok((url, size))
    }
}
