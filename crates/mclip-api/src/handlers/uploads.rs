//! Presigned uploads.

use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics::record_upload_presigned;
use crate::state::AppState;

/// Lifetime of an issued PUT URL.
pub const UPLOAD_URL_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadRequest {
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Presigned PUT URL; the client must send the same content type and length
    pub upload_url: String,
    pub key: String,
    /// Value to submit as `sourceUrl` once the upload finishes
    pub source_url: String,
    pub expires_in: u64,
}

/// Issue a presigned PUT for a video under the caller's upload prefix.
pub async fn create_upload(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CreateUploadRequest>, JsonRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let uploads = state
        .uploads
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Uploads are not configured".to_string()))?;

    let target = uploads.policy.validate(
        &user.uid,
        &request.filename,
        &request.content_type,
        request.size_bytes,
    )?;
    let upload_url = uploads
        .r2
        .presign_put(&target.key, &target.content_type, target.size_bytes, UPLOAD_URL_TTL)
        .await?;

    record_upload_presigned();
    info!(uid = %user.uid, key = %target.key, size = target.size_bytes, "Upload URL issued");

    Ok(Json(UploadResponse {
        upload_url,
        source_url: uploads.r2.public_url(&target.key),
        key: target.key,
        expires_in: UPLOAD_URL_TTL.as_secs(),
    }))
}
