//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use mclip_pipeline::PipelineError;
use mclip_storage::StorageError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub(crate) fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Pipeline(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Pipeline(e) if e.is_bad_request() => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(e) if e.is_unauthorized() => StatusCode::UNAUTHORIZED,
            ApiError::Pipeline(PipelineError::MediaFailed(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Storage(StorageError::UploadRejected(_)) => StatusCode::BAD_REQUEST,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = if status.is_server_error() {
            error!(status = %status, "Request failed: {}", self);
            if std::env::var("ENVIRONMENT").is_ok_and(|e| e.eq_ignore_ascii_case("production")) {
                "An internal error occurred".to_string()
            } else {
                self.to_string()
            }
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use mclip_models::ContinuationError;

    use super::*;

    #[test]
    fn test_pipeline_errors_map_to_status() {
        let cases = [
            (PipelineError::job_not_found("j"), StatusCode::NOT_FOUND),
            (PipelineError::clip_not_found("c"), StatusCode::NOT_FOUND),
            (PipelineError::invalid_webhook("missing id"), StatusCode::BAD_REQUEST),
            (ContinuationError::BadSignature.into(), StatusCode::UNAUTHORIZED),
            (PipelineError::media_failed("down"), StatusCode::BAD_GATEWAY),
            (PipelineError::config_error("no token"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn test_rejected_upload_is_client_error() {
        let err = ApiError::from(StorageError::rejected("File is empty"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(StorageError::PresignFailed("x".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
