//! Repository for clip documents stored under their job.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use mclip_models::{Clip, ClipId, ClipPatch, ClipStatus, JobId, MomentScores, MomentType};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_conflict;
use crate::retry::conflict_exhausted;
use crate::types::{Document, ToFirestoreValue, Value};
use crate::{JOBS_COLLECTION, MAX_CONDITIONAL_RETRIES};

/// Repository for `clip_jobs/{job_id}/clips/{clip_id}` documents.
#[derive(Clone)]
pub struct ClipRepository {
    client: FirestoreClient,
}

impl ClipRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    fn collection(job_id: &JobId) -> String {
        format!("{}/{}/clips", JOBS_COLLECTION, job_id)
    }

    /// Create a clip record.
    pub async fn create(&self, clip: &Clip) -> FirestoreResult<()> {
        self.client
            .create_document(&Self::collection(&clip.job_id), clip.id.as_str(), clip_to_fields(clip))
            .await?;
        Ok(())
    }

    pub async fn get(&self, job_id: &JobId, clip_id: &ClipId) -> FirestoreResult<Option<Clip>> {
        Ok(self.get_with_version(job_id, clip_id).await?.map(|(clip, _)| clip))
    }

    async fn get_with_version(
        &self,
        job_id: &JobId,
        clip_id: &ClipId,
    ) -> FirestoreResult<Option<(Clip, Option<String>)>> {
        let collection = Self::collection(job_id);
        let doc = self
            .client
            .with_retry("get_clip", || self.client.get_document(&collection, clip_id.as_str()))
            .await?;

        match doc {
            Some(d) => Ok(Some((document_to_clip(&d, job_id, clip_id)?, d.update_time))),
            None => Ok(None),
        }
    }

    /// All clips of a job, ordered by start time.
    pub async fn list(&self, job_id: &JobId) -> FirestoreResult<Vec<Clip>> {
        let collection = Self::collection(job_id);
        let docs = self
            .client
            .with_retry("list_clips", || self.client.list_all_documents(&collection))
            .await?;

        let mut clips = Vec::with_capacity(docs.len());
        for doc in &docs {
            let Some(id) = doc.id() else {
                continue;
            };
            clips.push(document_to_clip(doc, job_id, &ClipId::from_string(id))?);
        }
        clips.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        Ok(clips)
    }

    /// Apply a guarded patch. Returns the updated clip, or `None` if the
    /// guard no longer holds.
    pub async fn apply_patch(
        &self,
        job_id: &JobId,
        clip_id: &ClipId,
        patch: &ClipPatch,
    ) -> FirestoreResult<Option<Clip>> {
        let collection = Self::collection(job_id);

        for attempt in 0..MAX_CONDITIONAL_RETRIES {
            let (mut clip, update_time) = self
                .get_with_version(job_id, clip_id)
                .await?
                .ok_or_else(|| FirestoreError::not_found(format!("{}/{}", collection, clip_id)))?;

            if !patch.admits(&clip) {
                debug!(
                    job_id = %job_id,
                    clip_id = %clip_id,
                    status = %clip.status,
                    "Clip patch no longer applies"
                );
                return Ok(None);
            }

            let now = Utc::now();
            let (fields, mask) = clip_patch_fields(patch, now);

            match self
                .client
                .update_document_with_precondition(
                    &collection,
                    clip_id.as_str(),
                    fields,
                    Some(mask),
                    update_time.as_deref(),
                )
                .await
            {
                Ok(_) => {
                    patch.apply(&mut clip, now);
                    return Ok(Some(clip));
                }
                Err(e) if e.is_precondition_failed() => {
                    record_conflict("clips");
                    tokio::time::sleep(Duration::from_millis(50 * (attempt as u64 + 1))).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(conflict_exhausted(&format!("clip {}", clip_id), MAX_CONDITIONAL_RETRIES))
    }

    pub async fn delete(&self, job_id: &JobId, clip_id: &ClipId) -> FirestoreResult<()> {
        self.client
            .delete_document(&Self::collection(job_id), clip_id.as_str())
            .await
    }
}

fn scores_to_value(scores: &MomentScores) -> Value {
    let mut fields = HashMap::new();
    fields.insert("hook_strength".to_string(), scores.hook_strength.to_firestore_value());
    fields.insert("emotional_impact".to_string(), scores.emotional_impact.to_firestore_value());
    fields.insert("conversion_potential".to_string(), scores.conversion_potential.to_firestore_value());
    fields.insert("overall".to_string(), scores.overall.to_firestore_value());
    Value::map(fields)
}

fn value_to_scores(value: Option<&Value>) -> MomentScores {
    let Some(fields) = value.and_then(Value::as_map) else {
        return MomentScores::default();
    };
    let doc = Document::new(fields.clone());
    MomentScores {
        hook_strength: doc.get("hook_strength").unwrap_or(0),
        emotional_impact: doc.get("emotional_impact").unwrap_or(0),
        conversion_potential: doc.get("conversion_potential").unwrap_or(0),
        overall: doc.get("overall").unwrap_or(0),
    }
}

pub(crate) fn clip_to_fields(clip: &Clip) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("clip_id".to_string(), clip.id.as_str().to_firestore_value());
    fields.insert("job_id".to_string(), clip.job_id.as_str().to_firestore_value());
    fields.insert("start_time".to_string(), clip.start_time.to_firestore_value());
    fields.insert("end_time".to_string(), clip.end_time.to_firestore_value());
    fields.insert("duration".to_string(), clip.duration.to_firestore_value());
    fields.insert("moment_type".to_string(), clip.moment_type.as_str().to_firestore_value());
    fields.insert("scores".to_string(), scores_to_value(&clip.scores));
    fields.insert("why_selected".to_string(), clip.why_selected.to_firestore_value());
    fields.insert("suggested_caption".to_string(), clip.suggested_caption.to_firestore_value());
    fields.insert("transcript_excerpt".to_string(), clip.transcript_excerpt.to_firestore_value());
    fields.insert("status".to_string(), clip.status.as_str().to_firestore_value());
    fields.insert("progress".to_string(), clip.progress.to_firestore_value());
    fields.insert("asset_url".to_string(), clip.asset_url.to_firestore_value());
    fields.insert("thumbnail_url".to_string(), clip.thumbnail_url.to_firestore_value());
    fields.insert("size_bytes".to_string(), clip.size_bytes.to_firestore_value());
    fields.insert("render_id".to_string(), clip.render_id.to_firestore_value());
    fields.insert("error_message".to_string(), clip.error_message.to_firestore_value());
    fields.insert("created_at".to_string(), clip.created_at.to_firestore_value());
    fields.insert("updated_at".to_string(), clip.updated_at.to_firestore_value());
    fields.insert("completed_at".to_string(), clip.completed_at.to_firestore_value());
    fields
}

fn clip_patch_fields(patch: &ClipPatch, now: DateTime<Utc>) -> (HashMap<String, Value>, Vec<String>) {
    let mut fields = HashMap::new();
    fields.insert("updated_at".to_string(), now.to_firestore_value());

    if let Some(status) = patch.status {
        fields.insert("status".to_string(), status.as_str().to_firestore_value());
    }
    if let Some(progress) = patch.progress {
        fields.insert("progress".to_string(), progress.to_firestore_value());
    }
    if let Some(url) = &patch.asset_url {
        fields.insert("asset_url".to_string(), url.to_firestore_value());
    }
    if let Some(url) = &patch.thumbnail_url {
        fields.insert("thumbnail_url".to_string(), url.to_firestore_value());
    }
    if let Some(size) = patch.size_bytes {
        fields.insert("size_bytes".to_string(), size.to_firestore_value());
    }
    if let Some(id) = &patch.render_id {
        fields.insert("render_id".to_string(), id.to_firestore_value());
    }
    if let Some(error) = &patch.error_message {
        fields.insert("error_message".to_string(), error.to_firestore_value());
    }
    if patch.stamps_completion() {
        fields.insert("completed_at".to_string(), now.to_firestore_value());
    }

    let mut mask: Vec<String> = fields.keys().cloned().collect();
    mask.sort();
    (fields, mask)
}

pub(crate) fn document_to_clip(doc: &Document, job_id: &JobId, clip_id: &ClipId) -> FirestoreResult<Clip> {
    let fields = doc
        .fields
        .as_ref()
        .ok_or_else(|| FirestoreError::invalid_response("Clip document has no fields"))?;

    let status_raw: String = doc.get("status").unwrap_or_default();
    let status = ClipStatus::parse(&status_raw).ok_or_else(|| {
        FirestoreError::invalid_response(format!("Clip {} has unknown status '{}'", clip_id, status_raw))
    })?;
    let moment_type: String = doc.get("moment_type").unwrap_or_default();
    let created_at = doc.get("created_at").unwrap_or_else(Utc::now);

    Ok(Clip {
        id: clip_id.clone(),
        job_id: job_id.clone(),
        start_time: doc.get("start_time").unwrap_or(0.0),
        end_time: doc.get("end_time").unwrap_or(0.0),
        duration: doc.get("duration").unwrap_or(0.0),
        moment_type: MomentType::from_label(&moment_type),
        scores: value_to_scores(fields.get("scores")),
        why_selected: doc.get("why_selected").unwrap_or_default(),
        suggested_caption: doc.get("suggested_caption").unwrap_or_default(),
        transcript_excerpt: doc.get("transcript_excerpt").unwrap_or_default(),
        status,
        progress: doc.get("progress").unwrap_or(0),
        asset_url: doc.get("asset_url"),
        thumbnail_url: doc.get("thumbnail_url"),
        size_bytes: doc.get("size_bytes").unwrap_or(0),
        render_id: doc.get("render_id"),
        error_message: doc.get("error_message"),
        created_at,
        updated_at: doc.get("updated_at").unwrap_or(created_at),
        completed_at: doc.get("completed_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::mock_client;
    use mclip_models::{ClipGuard, Moment};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_clip(id: &str, start: f64) -> Clip {
        let moment = Moment {
            start_time: start,
            end_time: start + 30.0,
            moment_type: MomentType::CallToAction,
            scores: MomentScores::clamped(90.0, 70.0, 95.0, 88.0),
            why_selected: "clear ask".into(),
            suggested_caption: "Sign up today".into(),
            transcript_excerpt: "sign up now".into(),
        };
        let mut clip = Clip::from_moment(&JobId::from_string("job-1"), &moment);
        clip.id = ClipId::from_string(id);
        clip
    }

    fn doc_json(clip: &Clip) -> serde_json::Value {
        serde_json::json!({
            "name": format!(
                "projects/test-project/databases/(default)/documents/clip_jobs/job-1/clips/{}",
                clip.id
            ),
            "fields": clip_to_fields(clip),
            "updateTime": "2026-01-01T00:00:00Z",
        })
    }

    #[test]
    fn test_clip_fields_round_trip() {
        let clip = sample_clip("c1", 12.5);
        let decoded = document_to_clip(
            &Document::new(clip_to_fields(&clip)),
            &clip.job_id,
            &clip.id,
        )
        .unwrap();

        assert_eq!(decoded.moment_type, MomentType::CallToAction);
        assert_eq!(decoded.scores, clip.scores);
        assert_eq!(decoded.start_time, 12.5);
        assert_eq!(decoded.status, ClipStatus::Pending);
        assert!(decoded.asset_url.is_none());
    }

    #[test]
    fn test_patch_fields_for_failure() {
        let patch = ClipPatch::when(ClipGuard::NonTerminal)
            .status(ClipStatus::Failed)
            .error("render failed");
        let (fields, mask) = clip_patch_fields(&patch, Utc::now());
        assert_eq!(
            mask,
            vec!["completed_at", "error_message", "status", "updated_at"]
        );
        assert_eq!(fields["status"], Value::StringValue("failed".into()));
    }

    #[tokio::test]
    async fn test_list_sorts_by_start_time() {
        let server = MockServer::start().await;
        let late = sample_clip("late", 90.0);
        let early = sample_clip("early", 10.0);

        Mock::given(method("GET"))
            .and(path("/v1/projects/test-project/databases/(default)/documents/clip_jobs/job-1/clips"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "documents": [doc_json(&late), doc_json(&early)]
            })))
            .mount(&server)
            .await;

        let repo = ClipRepository::new(mock_client(&server.uri()).await);
        let clips = repo.list(&JobId::from_string("job-1")).await.unwrap();
        let ids: Vec<&str> = clips.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }
}
