//! Application state.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use mclip_events::{EventPublisher, EventsConfig};
use mclip_firestore::FirestoreClient;
use mclip_pipeline::adapters::{
    FirestoreJobStore, FirestoreNotifier, PredictionMediaJobs, R2AssetStore, ResolverSource,
};
use mclip_pipeline::{AnalyzerChain, GeminiConfig, Pipeline, PipelineConfig, Ports};
use mclip_services::{PredictionClient, SourceResolverClient};
use mclip_storage::{R2Client, UploadPolicy};

use crate::auth::TokenVerifier;
use crate::config::ApiConfig;

/// Client-direct upload issuing.
#[derive(Clone)]
pub struct Uploads {
    pub r2: R2Client,
    pub policy: UploadPolicy,
}

/// Backing services checked by `/ready`.
#[derive(Clone)]
pub struct Backends {
    pub firestore: FirestoreClient,
    pub storage: R2Client,
    pub events: Option<EventPublisher>,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: Pipeline,
    pub auth: Option<Arc<TokenVerifier>>,
    pub uploads: Option<Uploads>,
    pub backends: Option<Backends>,
}

impl AppState {
    /// Wire the pipeline to Firestore, R2, the prediction service and Redis.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let pipeline_config = PipelineConfig::from_env();

        let firestore = FirestoreClient::from_env()
            .await
            .context("Firestore client")?;
        let r2 = R2Client::from_env().await.context("R2 client")?;
        let events = match EventsConfig::from_env().and_then(|c| EventPublisher::from_config(&c)) {
            Ok(publisher) => Some(publisher),
            Err(e) => {
                warn!("Real-time events disabled: {}", e);
                None
            }
        };

        let media = PredictionClient::from_env().context("prediction client")?;
        if !media.is_configured() {
            warn!("MEDIA_API_TOKEN not set, job submission will be refused");
        }
        let resolver = SourceResolverClient::from_env().context("resolver client")?;
        let analyzers = AnalyzerChain::from_config(GeminiConfig::from_env())
            .context("moment analyzers")?;
        info!("Moment analyzers: {:?}", analyzers.names());

        let ports = Ports {
            store: Arc::new(FirestoreJobStore::new(firestore.clone())),
            assets: Arc::new(R2AssetStore::new(r2.clone()).context("asset store")?),
            media: Arc::new(PredictionMediaJobs::new(media, pipeline_config.clone())),
            resolver: Arc::new(ResolverSource::new(resolver, Some(r2.public_url("uploads/")))),
            notifier: Arc::new(FirestoreNotifier::new(firestore.clone(), events.clone())),
        };
        let pipeline = Pipeline::new(ports, analyzers, pipeline_config);

        let state = Self::from_pipeline(config, pipeline)
            .with_uploads(r2.clone(), UploadPolicy::from_env())
            .with_backends(Backends {
                firestore,
                storage: r2,
                events,
            });
        Ok(state)
    }

    /// State around an already-wired pipeline. Auth comes from `config`.
    pub fn from_pipeline(config: ApiConfig, pipeline: Pipeline) -> Self {
        let auth = match config.jwt_secret.as_deref() {
            Some(secret) => Some(Arc::new(TokenVerifier::new(secret))),
            None => {
                warn!("AUTH_JWT_SECRET not set, authenticated routes will reject all requests");
                None
            }
        };
        Self {
            config,
            pipeline,
            auth,
            uploads: None,
            backends: None,
        }
    }

    pub fn with_uploads(mut self, r2: R2Client, policy: UploadPolicy) -> Self {
        self.uploads = Some(Uploads { r2, policy });
        self
    }

    pub fn with_backends(mut self, backends: Backends) -> Self {
        self.backends = Some(backends);
        self
    }
}
