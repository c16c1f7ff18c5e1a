//! Firestore REST API client.
//!
//! This crate provides:
//! - Typed repositories for clip jobs, their clips and user notifications
//! - Service account authentication via gcp_auth with token caching
//! - Conditional (update-time precondition) writes for status transitions
//! - Retry with exponential backoff and request metrics

pub mod client;
pub mod clip_repo;
pub mod error;
pub mod job_repo;
pub mod metrics;
pub mod notification_repo;
pub mod retry;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use clip_repo::ClipRepository;
pub use error::{FirestoreError, FirestoreResult};
pub use job_repo::JobRepository;
pub use notification_repo::NotificationRepository;
pub use retry::RetryConfig;
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};

/// Top-level collection holding clip jobs.
pub const JOBS_COLLECTION: &str = "clip_jobs";

/// Maximum attempts for read-check-conditional-write loops.
pub(crate) const MAX_CONDITIONAL_RETRIES: u32 = 5;
