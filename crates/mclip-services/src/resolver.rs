//! Direct-source resolver client.
//!
//! Turns a page reference (e.g. a video site URL) into a directly fetchable
//! stream URL. Resolution is best effort: every failure degrades to `None`.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ServiceError, ServiceResult};

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Base URL; resolution is skipped when unset
    pub base_url: Option<String>,
    pub api_key: String,
    /// Quality hint (`best`, `720p`, `480p`, `360p`)
    pub quality: String,
    /// Container hint
    pub format: String,
    /// Bound on the single attempt
    pub timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: String::new(),
            quality: "best".to_string(),
            format: "mp4".to_string(),
            timeout: Duration::from_secs(20),
        }
    }
}

impl ResolverConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("RESOLVER_URL").ok().filter(|u| !u.is_empty()),
            api_key: std::env::var("RESOLVER_API_KEY").unwrap_or_default(),
            quality: std::env::var("RESOLVER_QUALITY").unwrap_or(defaults.quality),
            format: defaults.format,
            timeout: Duration::from_secs(
                std::env::var("RESOLVER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(20),
            ),
        }
    }
}

#[derive(Debug, Serialize)]
struct ResolveRequest<'a> {
    url: &'a str,
    api_key: &'a str,
    quality: &'a str,
    format: &'a str,
}

/// A resolved, directly fetchable source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub filesize: Option<u64>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Client for the resolver service.
#[derive(Clone)]
pub struct SourceResolverClient {
    http: Client,
    config: ResolverConfig,
}

impl SourceResolverClient {
    pub fn new(config: ResolverConfig) -> ServiceResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ServiceError::Network)?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> ServiceResult<Self> {
        Self::new(ResolverConfig::from_env())
    }

    pub fn is_configured(&self) -> bool {
        self.config.base_url.is_some()
    }

    /// Resolve `source_url`. Returns `None` on any failure.
    pub async fn resolve(&self, source_url: &str) -> Option<ResolvedSource> {
        match self.try_resolve(source_url).await {
            Ok(resolved) => {
                info!(source = %source_url, duration = ?resolved.duration, "Resolved direct source");
                metrics::counter!("mclip_resolver_requests_total", "outcome" => "resolved").increment(1);
                Some(resolved)
            }
            Err(e) => {
                warn!(source = %source_url, "Direct source unavailable: {}", e);
                metrics::counter!("mclip_resolver_requests_total", "outcome" => "unavailable").increment(1);
                None
            }
        }
    }

    async fn try_resolve(&self, source_url: &str) -> ServiceResult<ResolvedSource> {
        let base = self
            .config
            .base_url
            .as_deref()
            .ok_or_else(|| ServiceError::not_configured("RESOLVER_URL not set"))?;
        let url = format!("{}/download-url", base.trim_end_matches('/'));

        let response = self
            .http
            .post(&url)
            .json(&ResolveRequest {
                url: source_url,
                api_key: &self.config.api_key,
                quality: &self.config.quality,
                format: &self.config.format,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::RequestFailed {
                status: status.as_u16(),
                body,
            });
        }

        let resolved: ResolvedSource = response.json().await?;
        match resolved.url.as_deref() {
            Some(u) if !u.is_empty() => Ok(resolved),
            _ => Err(ServiceError::invalid_response("resolver returned no url")),
        }
    }
}
