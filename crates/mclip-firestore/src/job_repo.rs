//! Repository for clip job documents.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use mclip_models::{GenerationContext, Job, JobId, JobPatch, JobStatus};

use crate::client::FirestoreClient;
use crate::clip_repo::ClipRepository;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_conflict;
use crate::retry::conflict_exhausted;
use crate::types::{Document, ToFirestoreValue, Value};
use crate::{JOBS_COLLECTION, MAX_CONDITIONAL_RETRIES};

/// Repository for `clip_jobs/{job_id}` documents.
#[derive(Clone)]
pub struct JobRepository {
    client: FirestoreClient,
}

impl JobRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Create a new job record.
    pub async fn create(&self, job: &Job) -> FirestoreResult<()> {
        self.client
            .create_document(JOBS_COLLECTION, job.id.as_str(), job_to_fields(job))
            .await?;
        info!(job_id = %job.id, "Created job record");
        Ok(())
    }

    /// Get a job by ID.
    pub async fn get(&self, job_id: &JobId) -> FirestoreResult<Option<Job>> {
        Ok(self
            .get_with_version(job_id)
            .await?
            .map(|(job, _)| job))
    }

    /// Get a job together with its `updateTime`.
    async fn get_with_version(&self, job_id: &JobId) -> FirestoreResult<Option<(Job, Option<String>)>> {
        let doc = self
            .client
            .with_retry("get_job", || self.client.get_document(JOBS_COLLECTION, job_id.as_str()))
            .await?;

        match doc {
            Some(d) => Ok(Some((document_to_job(&d, job_id)?, d.update_time))),
            None => Ok(None),
        }
    }

    /// Apply a patch if it is still a legal transition.
    ///
    /// Reads the job, checks the patch against the current state and writes
    /// with an `updateTime` precondition. Losing the race re-reads and
    /// re-checks, so exactly one concurrent caller wins any given
    /// transition. Returns the updated job, or `None` when the patch no
    /// longer applies.
    pub async fn apply_patch(&self, job_id: &JobId, patch: &JobPatch) -> FirestoreResult<Option<Job>> {
        for attempt in 0..MAX_CONDITIONAL_RETRIES {
            let (mut job, update_time) = self
                .get_with_version(job_id)
                .await?
                .ok_or_else(|| FirestoreError::not_found(format!("{}/{}", JOBS_COLLECTION, job_id)))?;

            if !patch.admits(&job) {
                debug!(
                    job_id = %job_id,
                    current = %job.status,
                    requested = %patch.status,
                    "Job patch no longer applies"
                );
                return Ok(None);
            }

            let now = Utc::now();
            let (fields, mask) = job_patch_fields(patch, now);

            match self
                .client
                .update_document_with_precondition(
                    JOBS_COLLECTION,
                    job_id.as_str(),
                    fields,
                    Some(mask),
                    update_time.as_deref(),
                )
                .await
            {
                Ok(_) => {
                    patch.apply(&mut job, now);
                    return Ok(Some(job));
                }
                Err(e) if e.is_precondition_failed() => {
                    record_conflict(JOBS_COLLECTION);
                    debug!(job_id = %job_id, attempt = attempt + 1, "Job changed concurrently, re-reading");
                    tokio::time::sleep(Duration::from_millis(50 * (attempt as u64 + 1))).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(conflict_exhausted(&format!("job {}", job_id), MAX_CONDITIONAL_RETRIES))
    }

    /// Delete a job and all of its clips.
    pub async fn delete(&self, job_id: &JobId) -> FirestoreResult<()> {
        let clips = ClipRepository::new(self.client.clone());
        for clip in clips.list(job_id).await? {
            clips.delete(job_id, &clip.id).await?;
        }
        self.client.delete_document(JOBS_COLLECTION, job_id.as_str()).await?;
        info!(job_id = %job_id, "Deleted job and clips");
        Ok(())
    }
}

fn context_to_value(ctx: &GenerationContext) -> Value {
    let mut fields = HashMap::new();
    fields.insert("industry".to_string(), ctx.industry.to_firestore_value());
    fields.insert("product_description".to_string(), ctx.product_description.to_firestore_value());
    fields.insert("target_audience".to_string(), ctx.target_audience.to_firestore_value());
    fields.insert("target_clip_duration".to_string(), ctx.target_clip_duration.to_firestore_value());
    fields.insert("max_clips".to_string(), ctx.max_clips.to_firestore_value());
    Value::map(fields)
}

fn value_to_context(value: Option<&Value>) -> GenerationContext {
    let defaults = GenerationContext::default();
    let Some(fields) = value.and_then(Value::as_map) else {
        return defaults;
    };
    let doc = Document::new(fields.clone());

    GenerationContext {
        industry: doc.get("industry").unwrap_or_default(),
        product_description: doc.get("product_description").unwrap_or_default(),
        target_audience: doc.get("target_audience").unwrap_or_default(),
        target_clip_duration: doc
            .get("target_clip_duration")
            .unwrap_or(defaults.target_clip_duration),
        max_clips: doc.get("max_clips").unwrap_or(defaults.max_clips),
    }
}

pub(crate) fn job_to_fields(job: &Job) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("job_id".to_string(), job.id.as_str().to_firestore_value());
    fields.insert("user_id".to_string(), job.user_id.to_firestore_value());
    fields.insert("source_url".to_string(), job.source_url.to_firestore_value());
    fields.insert("status".to_string(), job.status.as_str().to_firestore_value());
    fields.insert("progress".to_string(), job.progress.to_firestore_value());
    fields.insert("video_duration".to_string(), job.video_duration.to_firestore_value());
    fields.insert("context".to_string(), context_to_value(&job.context));
    fields.insert("analysis".to_string(), job.analysis.to_firestore_value());
    fields.insert("transcription_id".to_string(), job.transcription_id.to_firestore_value());
    fields.insert("error_message".to_string(), job.error_message.to_firestore_value());
    fields.insert("created_at".to_string(), job.created_at.to_firestore_value());
    fields.insert("updated_at".to_string(), job.updated_at.to_firestore_value());
    fields.insert("started_at".to_string(), job.started_at.to_firestore_value());
    fields.insert("completed_at".to_string(), job.completed_at.to_firestore_value());
    fields
}

/// Fields and update mask for a patch.
fn job_patch_fields(patch: &JobPatch, now: chrono::DateTime<Utc>) -> (HashMap<String, Value>, Vec<String>) {
    let mut fields = HashMap::new();
    fields.insert("status".to_string(), patch.status.as_str().to_firestore_value());
    fields.insert("updated_at".to_string(), now.to_firestore_value());

    if let Some(progress) = patch.progress {
        fields.insert("progress".to_string(), progress.to_firestore_value());
    }
    if let Some(duration) = patch.video_duration {
        fields.insert("video_duration".to_string(), duration.to_firestore_value());
    }
    if let Some(analysis) = &patch.analysis {
        fields.insert("analysis".to_string(), analysis.to_firestore_value());
    }
    if let Some(id) = &patch.transcription_id {
        fields.insert("transcription_id".to_string(), id.to_firestore_value());
    }
    if let Some(error) = &patch.error_message {
        fields.insert("error_message".to_string(), error.to_firestore_value());
    }
    if patch.stamp_started {
        fields.insert("started_at".to_string(), now.to_firestore_value());
    }
    if patch.stamps_completion() {
        fields.insert("completed_at".to_string(), now.to_firestore_value());
    }

    let mut mask: Vec<String> = fields.keys().cloned().collect();
    mask.sort();
    (fields, mask)
}

pub(crate) fn document_to_job(doc: &Document, job_id: &JobId) -> FirestoreResult<Job> {
    let fields = doc
        .fields
        .as_ref()
        .ok_or_else(|| FirestoreError::invalid_response("Job document has no fields"))?;

    let status_raw: String = doc.get("status").unwrap_or_default();
    let status = JobStatus::parse(&status_raw).ok_or_else(|| {
        FirestoreError::invalid_response(format!("Job {} has unknown status '{}'", job_id, status_raw))
    })?;

    let created_at = doc.get("created_at").unwrap_or_else(Utc::now);

    Ok(Job {
        id: job_id.clone(),
        user_id: doc.get("user_id").unwrap_or_default(),
        source_url: doc.get("source_url").unwrap_or_default(),
        status,
        progress: doc.get("progress").unwrap_or(0),
        video_duration: doc.get("video_duration").unwrap_or(0.0),
        context: value_to_context(fields.get("context")),
        analysis: doc.get("analysis"),
        transcription_id: doc.get("transcription_id"),
        error_message: doc.get("error_message"),
        created_at,
        updated_at: doc.get("updated_at").unwrap_or(created_at),
        started_at: doc.get("started_at"),
        completed_at: doc.get("completed_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::mock_client;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOC_PATH: &str = "/v1/projects/test-project/databases/(default)/documents/clip_jobs/job-1";

    fn sample_job(status: JobStatus) -> Job {
        let mut job = Job::new(
            "user-1",
            "https://example.com/watch?v=abc",
            GenerationContext {
                industry: "fitness".into(),
                product_description: "running shoes".into(),
                target_audience: "marathoners".into(),
                target_clip_duration: 20.0,
                max_clips: 3,
            },
        )
        .with_video_duration(300.0);
        job.id = JobId::from_string("job-1");
        job.status = status;
        job
    }

    fn doc_json(job: &Job, update_time: &str) -> serde_json::Value {
        serde_json::json!({
            "name": format!("projects/test-project/databases/(default)/documents/clip_jobs/{}", job.id),
            "fields": job_to_fields(job),
            "updateTime": update_time,
        })
    }

    #[test]
    fn test_job_fields_round_trip() {
        let job = sample_job(JobStatus::Clipping);
        let doc = Document::new(job_to_fields(&job));
        let decoded = document_to_job(&doc, &job.id).unwrap();

        assert_eq!(decoded.status, JobStatus::Clipping);
        assert_eq!(decoded.user_id, "user-1");
        assert_eq!(decoded.video_duration, 300.0);
        assert_eq!(decoded.context, job.context);
        assert!(decoded.completed_at.is_none());
    }

    #[test]
    fn test_patch_mask_only_touches_set_fields() {
        let patch = JobPatch::to(JobStatus::Analyzing).with_progress(30);
        let (fields, mask) = job_patch_fields(&patch, Utc::now());
        assert_eq!(mask, vec!["progress", "status", "updated_at"]);
        assert!(!fields.contains_key("completed_at"));

        let (_, mask) = job_patch_fields(&JobPatch::to(JobStatus::Completed), Utc::now());
        assert!(mask.contains(&"completed_at".to_string()));
    }

    #[test]
    fn test_unknown_status_is_invalid() {
        let mut fields = job_to_fields(&sample_job(JobStatus::Pending));
        fields.insert("status".into(), "queued".to_firestore_value());
        let err = document_to_job(&Document::new(fields), &JobId::from_string("job-1")).unwrap_err();
        assert!(matches!(err, FirestoreError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_apply_patch_skips_when_not_admitted() {
        let server = MockServer::start().await;
        let job = sample_job(JobStatus::Completed);

        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(doc_json(&job, "2026-01-01T00:00:00Z")))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let repo = JobRepository::new(mock_client(&server.uri()).await);
        let result = repo
            .apply_patch(&job.id, &JobPatch::to(JobStatus::Completed))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_apply_patch_sends_update_time_precondition() {
        let server = MockServer::start().await;
        let job = sample_job(JobStatus::Clipping);

        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(doc_json(&job, "2026-01-01T00:00:00Z")))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path(DOC_PATH))
            .and(query_param("currentDocument.updateTime", "2026-01-01T00:00:00Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(doc_json(&job, "2026-01-01T00:00:01Z")))
            .expect(1)
            .mount(&server)
            .await;

        let repo = JobRepository::new(mock_client(&server.uri()).await);
        let updated = repo
            .apply_patch(&job.id, &JobPatch::to(JobStatus::Completed).with_progress(100))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, JobStatus::Completed);
        assert!(updated.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_apply_patch_rereads_after_conflict() {
        let server = MockServer::start().await;
        let clipping = sample_job(JobStatus::Clipping);
        let completed = sample_job(JobStatus::Completed);

        // First read sees CLIPPING, the write loses the race, the re-read sees COMPLETED.
        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(doc_json(&clipping, "t1")))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(doc_json(&completed, "t2")))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path(DOC_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                r#"{"error":{"status":"FAILED_PRECONDITION"}}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let repo = JobRepository::new(mock_client(&server.uri()).await);
        let result = repo
            .apply_patch(&clipping.id, &JobPatch::to(JobStatus::Completed))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_apply_patch_missing_job() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let repo = JobRepository::new(mock_client(&server.uri()).await);
        let err = repo
            .apply_patch(&JobId::from_string("job-1"), &JobPatch::failed("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, FirestoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_removes_clips_before_job() {
        let server = MockServer::start().await;
        let clip_doc = |id: &str, start: f64| {
            serde_json::json!({
                "name": format!("{}/clips/{}", DOC_PATH.trim_start_matches("/v1/"), id),
                "fields": {
                    "status": {"stringValue": "completed"},
                    "start_time": {"doubleValue": start},
                },
            })
        };

        Mock::given(method("GET"))
            .and(path(format!("{}/clips", DOC_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "documents": [clip_doc("job-1-m00", 10.0), clip_doc("job-1-m01", 40.0)],
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .expect(3)
            .mount(&server)
            .await;

        let repo = JobRepository::new(mock_client(&server.uri()).await);
        repo.delete(&JobId::from_string("job-1")).await.unwrap();

        let deletes: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.method.to_string() == "DELETE")
            .map(|r| r.url.path().to_string())
            .collect();
        assert_eq!(
            deletes,
            vec![
                format!("{}/clips/job-1-m00", DOC_PATH),
                format!("{}/clips/job-1-m01", DOC_PATH),
                DOC_PATH.to_string(),
            ]
        );
    }
}
