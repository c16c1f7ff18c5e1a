//! Completion aggregation.
//!
//! Any handler that moves a clip to a terminal state calls
//! [`Pipeline::finalize_if_complete`]. Several callers can observe "all
//! clips terminal" at once; the CLIPPING -> COMPLETED write is conditional,
//! so exactly one of them wins and only the winner notifies.

use mclip_models::{progress, ClipStatus, Job, JobId, JobPatch, JobStatus, Notification};

use crate::error::PipelineResult;
use crate::logging::JobLogger;
use crate::metrics::record_job_finished;
use crate::Pipeline;

/// A job this caller finalized.
#[derive(Debug, Clone)]
pub struct Finalized {
    pub job: Job,
    pub succeeded: usize,
    pub total: usize,
}

impl Pipeline {
    /// Complete the job if every clip is terminal.
    ///
    /// Returns `Some` only for the single caller whose conditional write
    /// completed the job.
    pub async fn finalize_if_complete(&self, job_id: &JobId) -> PipelineResult<Option<Finalized>> {
        let logger = JobLogger::new(job_id, "aggregate");

        let Some(job) = self.ports.store.get_job(job_id).await? else {
            return Ok(None);
        };
        if job.status != JobStatus::Clipping {
            return Ok(None);
        }

        let clips = self.ports.store.list_clips(job_id).await?;
        let pending = clips.iter().filter(|c| !c.is_terminal()).count();
        if pending > 0 {
            logger.log_progress(&format!("{} of {} clips still in flight", pending, clips.len()));
            return Ok(None);
        }

        let succeeded = clips
            .iter()
            .filter(|c| c.status == ClipStatus::Completed)
            .count();
        let total = clips.len();

        let patch = JobPatch::to(JobStatus::Completed).with_progress(progress::COMPLETED);
        let Some(job) = self.ports.store.apply_job_patch(job_id, &patch).await? else {
            logger.log_progress("Job already finalized by another delivery");
            return Ok(None);
        };

        record_job_finished("completed");
        logger.log_completion(&format!("{} of {} clips succeeded", succeeded, total));

        let notification = Notification::job_completed(&job.user_id, job_id, succeeded, total);
        if let Err(e) = self.ports.notifier.notify(&notification).await {
            // The job is already completed; a retry here would double-notify.
            logger.log_error(&format!("Completion notification failed: {}", e));
        }

        Ok(Some(Finalized {
            job,
            succeeded,
            total,
        }))
    }
}

#[cfg(test)]
mod tests {
    use mclip_models::ClipStatus;

    use crate::testkit::Harness;

    use super::*;

    #[tokio::test]
    async fn test_waits_for_in_flight_clips() {
        let h = Harness::unresolvable();
        let job = h.seed_job(JobStatus::Clipping).await;
        h.seed_clip(&job, ClipStatus::Completed, None).await;
        h.seed_clip(&job, ClipStatus::Processing, None).await;

        assert!(h.pipeline.finalize_if_complete(&job.id).await.unwrap().is_none());
        assert_eq!(h.job(&job.id).await.status, JobStatus::Clipping);
        assert!(h.notifier.notifications().await.is_empty());
    }

    #[tokio::test]
    async fn test_completes_and_counts_successes() {
        let h = Harness::unresolvable();
        let job = h.seed_job(JobStatus::Clipping).await;
        h.seed_clip(&job, ClipStatus::Completed, None).await;
        h.seed_clip(&job, ClipStatus::Failed, None).await;
        h.seed_clip(&job, ClipStatus::Completed, None).await;

        let finalized = h.pipeline.finalize_if_complete(&job.id).await.unwrap().unwrap();
        assert_eq!((finalized.succeeded, finalized.total), (2, 3));
        assert_eq!(finalized.job.status, JobStatus::Completed);
        assert_eq!(finalized.job.progress, 100);
        assert!(finalized.job.completed_at.is_some());

        let sent = h.notifier.notifications().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].user_id, "user-1");
        assert_eq!(sent[0].entity_id, job.id.to_string());
        assert!(sent[0].message.contains("2 of 3"));
    }

    #[tokio::test]
    async fn test_concurrent_finalization_notifies_once() {
        let h = Harness::unresolvable();
        let job = h.seed_job(JobStatus::Clipping).await;
        for _ in 0..3 {
            h.seed_clip(&job, ClipStatus::Completed, None).await;
        }

        let (a, b, c) = tokio::join!(
            h.pipeline.finalize_if_complete(&job.id),
            h.pipeline.finalize_if_complete(&job.id),
            h.pipeline.finalize_if_complete(&job.id),
        );
        let winners = [a, b, c].into_iter().filter(|r| matches!(r, Ok(Some(_)))).count();
        assert_eq!(winners, 1);
        assert_eq!(h.notifier.notifications().await.len(), 1);
    }

    #[tokio::test]
    async fn test_ignores_jobs_outside_clipping() {
        let h = Harness::unresolvable();
        let job = h.seed_job(JobStatus::Failed).await;
        h.seed_clip(&job, ClipStatus::Completed, None).await;

        assert!(h.pipeline.finalize_if_complete(&job.id).await.unwrap().is_none());
        assert!(h.pipeline.finalize_if_complete(&JobId::new()).await.unwrap().is_none());
    }
}
