//! Webhook-driven clip pipeline.
//!
//! A job moves through transcription, moment analysis, per-clip rendering
//! and thumbnail extraction. Every external step finishes with a webhook
//! that re-enters [`Pipeline::handle_webhook`]; there is no queue or
//! scheduler. This crate provides:
//! - Transcript parsing ([`transcript`])
//! - Moment analyzers behind one trait ([`analyzer`])
//! - Clip lifecycle and completion aggregation
//! - Ports to storage, media services and notifications, with production
//!   adapters and in-memory implementations

pub mod adapters;
mod aggregator;
pub mod analyzer;
pub mod config;
pub mod error;
mod lifecycle;
pub mod logging;
pub mod memory;
pub mod metrics;
pub mod ports;
mod submission;
#[cfg(test)]
mod testkit;
pub mod transcript;
pub mod webhook;

use std::sync::Arc;

pub use aggregator::Finalized;
pub use analyzer::{AnalyzerChain, GeminiConfig, MomentAnalyzer};
pub use config::{PipelineConfig, MEDIA_WEBHOOK_PATH};
pub use error::{PipelineError, PipelineResult};
pub use logging::JobLogger;
pub use ports::{AssetStore, JobStore, MediaJobs, Notifier, Ports, SourceResolver};
pub use submission::JobSubmission;
pub use webhook::{WebhookEvent, WebhookOutcome, WebhookQuery};

/// The orchestrator. Cheap to clone; all state lives behind the ports.
#[derive(Clone)]
pub struct Pipeline {
    ports: Ports,
    analyzers: Arc<AnalyzerChain>,
    config: Arc<PipelineConfig>,
}

impl Pipeline {
    pub fn new(ports: Ports, analyzers: AnalyzerChain, config: PipelineConfig) -> Self {
        Self {
            ports,
            analyzers: Arc::new(analyzers),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.ports.store
    }

    /// Whether jobs can be submitted at all.
    pub fn media_configured(&self) -> bool {
        self.ports.media.is_configured()
    }
}
