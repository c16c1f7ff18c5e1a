//! Webhook continuations.
//!
//! External services know nothing about pipeline stages. Each outbound
//! request carries a callback URL whose query string encodes a
//! [`Continuation`]; the webhook router decodes it to resume the right
//! stage. When a signing secret is configured the continuation is
//! HMAC-signed so forged callbacks are rejected before any lookup.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use url::Url;

use crate::{ClipId, JobId};

type HmacSha256 = Hmac<Sha256>;

/// Query parameter names used in callback URLs.
pub const JOB_ID_PARAM: &str = "jobId";
pub const STEP_PARAM: &str = "step";
pub const CLIP_ID_PARAM: &str = "clipId";
pub const SIGNATURE_PARAM: &str = "sig";

/// Pipeline stage a webhook resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Transcribe,
    Clip,
    Thumbnail,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::Transcribe => "transcribe",
            PipelineStep::Clip => "clip",
            PipelineStep::Thumbnail => "thumbnail",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transcribe" => Some(PipelineStep::Transcribe),
            "clip" => Some(PipelineStep::Clip),
            "thumbnail" => Some(PipelineStep::Thumbnail),
            _ => None,
        }
    }

    /// Whether the step addresses a single clip.
    pub fn requires_clip(&self) -> bool {
        matches!(self, PipelineStep::Clip | PipelineStep::Thumbnail)
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors decoding or verifying a continuation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContinuationError {
    #[error("Missing query parameter: {0}")]
    MissingParam(&'static str),

    #[error("Unknown pipeline step: {0}")]
    UnknownStep(String),

    #[error("Invalid callback base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Invalid signing key: {0}")]
    InvalidKey(String),

    #[error("Continuation signature missing or invalid")]
    BadSignature,
}

/// Explicit `(job, step, clip?)` tuple carried through callback URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Continuation {
    pub job_id: JobId,
    pub step: PipelineStep,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_id: Option<ClipId>,
}

impl Continuation {
    pub fn transcribe(job_id: &JobId) -> Self {
        Self {
            job_id: job_id.clone(),
            step: PipelineStep::Transcribe,
            clip_id: None,
        }
    }

    pub fn clip(job_id: &JobId, clip_id: &ClipId) -> Self {
        Self {
            job_id: job_id.clone(),
            step: PipelineStep::Clip,
            clip_id: Some(clip_id.clone()),
        }
    }

    pub fn thumbnail(job_id: &JobId, clip_id: &ClipId) -> Self {
        Self {
            job_id: job_id.clone(),
            step: PipelineStep::Thumbnail,
            clip_id: Some(clip_id.clone()),
        }
    }

    /// Decode from raw query values.
    pub fn from_query(
        job_id: Option<&str>,
        step: Option<&str>,
        clip_id: Option<&str>,
    ) -> Result<Self, ContinuationError> {
        let job_id = job_id
            .filter(|s| !s.is_empty())
            .ok_or(ContinuationError::MissingParam(JOB_ID_PARAM))?;
        let step_raw = step
            .filter(|s| !s.is_empty())
            .ok_or(ContinuationError::MissingParam(STEP_PARAM))?;
        let step = PipelineStep::parse(step_raw)
            .ok_or_else(|| ContinuationError::UnknownStep(step_raw.to_string()))?;

        let clip_id = clip_id.filter(|s| !s.is_empty()).map(ClipId::from_string);
        if step.requires_clip() && clip_id.is_none() {
            return Err(ContinuationError::MissingParam(CLIP_ID_PARAM));
        }

        Ok(Self {
            job_id: JobId::from_string(job_id),
            step,
            // Transcribe continuations never address a clip.
            clip_id: if step.requires_clip() { clip_id } else { None },
        })
    }

    /// Canonical string the signature covers.
    fn signing_payload(&self) -> String {
        format!(
            "{}|{}|{}",
            self.job_id,
            self.step,
            self.clip_id.as_ref().map(ClipId::as_str).unwrap_or("")
        )
    }

    /// Sign the continuation with HMAC-SHA256.
    pub fn sign(&self, secret: &str) -> Result<String, ContinuationError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| ContinuationError::InvalidKey(e.to_string()))?;
        mac.update(self.signing_payload().as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    /// Verify a signature produced by [`Continuation::sign`].
    pub fn verify(&self, secret: &str, signature: Option<&str>) -> Result<(), ContinuationError> {
        let sig_bytes = signature
            .and_then(|s| URL_SAFE_NO_PAD.decode(s).ok())
            .ok_or(ContinuationError::BadSignature)?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| ContinuationError::InvalidKey(e.to_string()))?;
        mac.update(self.signing_payload().as_bytes());
        mac.verify_slice(&sig_bytes)
            .map_err(|_| ContinuationError::BadSignature)
    }

    /// Build the callback URL an external service should invoke.
    pub fn callback_url(&self, base: &str, secret: Option<&str>) -> Result<String, ContinuationError> {
        let mut url = Url::parse(base).map_err(|e| ContinuationError::InvalidBaseUrl(e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair(JOB_ID_PARAM, self.job_id.as_str());
            query.append_pair(STEP_PARAM, self.step.as_str());
            if let Some(clip_id) = &self.clip_id {
                query.append_pair(CLIP_ID_PARAM, clip_id.as_str());
            }
            if let Some(secret) = secret {
                query.append_pair(SIGNATURE_PARAM, &self.sign(secret)?);
            }
        }
        Ok(url.into())
    }
}
