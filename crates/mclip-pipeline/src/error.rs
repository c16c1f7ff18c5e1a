//! Pipeline error types.

use thiserror::Error;

use mclip_models::ContinuationError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Clip not found: {0}")]
    ClipNotFound(String),

    #[error("Invalid webhook: {0}")]
    InvalidWebhook(String),

    #[error("Invalid continuation: {0}")]
    Continuation(#[from] ContinuationError),

    #[error("Transcript error: {0}")]
    Transcript(String),

    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Media job failed: {0}")]
    MediaFailed(String),

    #[error("Asset error: {0}")]
    Asset(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Notification failed: {0}")]
    Notify(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Firestore error: {0}")]
    Firestore(#[from] mclip_firestore::FirestoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] mclip_storage::StorageError),

    #[error("Service error: {0}")]
    Service(#[from] mclip_services::ServiceError),

    #[error("Event error: {0}")]
    Events(#[from] mclip_events::EventError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn job_not_found(id: impl Into<String>) -> Self {
        Self::JobNotFound(id.into())
    }

    pub fn clip_not_found(id: impl Into<String>) -> Self {
        Self::ClipNotFound(id.into())
    }

    pub fn invalid_webhook(msg: impl Into<String>) -> Self {
        Self::InvalidWebhook(msg.into())
    }

    pub fn analysis_failed(msg: impl Into<String>) -> Self {
        Self::AnalysisFailed(msg.into())
    }

    pub fn media_failed(msg: impl Into<String>) -> Self {
        Self::MediaFailed(msg.into())
    }

    pub fn asset(msg: impl Into<String>) -> Self {
        Self::Asset(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// The referenced job or clip does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PipelineError::JobNotFound(_) | PipelineError::ClipNotFound(_))
    }

    /// The request itself is malformed.
    pub fn is_bad_request(&self) -> bool {
        match self {
            PipelineError::InvalidWebhook(_) => true,
            PipelineError::Continuation(e) => !matches!(e, ContinuationError::BadSignature),
            _ => false,
        }
    }

    /// The continuation signature did not verify.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, PipelineError::Continuation(ContinuationError::BadSignature))
    }
}
