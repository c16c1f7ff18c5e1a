//! Media service webhook ingress.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use tracing::warn;

use mclip_pipeline::{WebhookEvent, WebhookOutcome, WebhookQuery};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Completion callback for transcription, render and thumbnail jobs.
///
/// Unauthenticated: the continuation in the query string (and its signature,
/// when signing is enabled) is what ties the delivery to a job.
pub async fn media_webhook(
    State(state): State<AppState>,
    query: Result<Query<WebhookQuery>, QueryRejection>,
    payload: Result<Json<WebhookEvent>, JsonRejection>,
) -> ApiResult<Json<WebhookOutcome>> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let Json(event) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    match state.pipeline.handle_webhook(&query, &event).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(e) => {
            warn!(
                job_id = query.job_id.as_deref().unwrap_or(""),
                step = query.step.as_deref().unwrap_or(""),
                "Webhook rejected: {}",
                e
            );
            Err(e.into())
        }
    }
}
