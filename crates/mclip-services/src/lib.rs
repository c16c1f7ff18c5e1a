//! Clients for external media services.
//!
//! This crate provides:
//! - A prediction API client for transcription, trim and thumbnail jobs
//! - Shared interpretation of external job status strings
//! - Callback or polling strategies for awaiting a prediction
//! - The direct-source resolver client (best effort, never fatal)

pub mod error;
pub mod prediction;
pub mod resolver;
pub mod status;

pub use error::{ServiceError, ServiceResult};
pub use prediction::{MediaApiConfig, Prediction, PredictionClient};
pub use resolver::{ResolvedSource, ResolverConfig, SourceResolverClient};
pub use status::{AwaitStrategy, ExternalStatus};
