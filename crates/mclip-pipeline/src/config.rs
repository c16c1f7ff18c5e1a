//! Pipeline configuration.

/// Path of the media webhook route, relative to the public base URL.
pub const MEDIA_WEBHOOK_PATH: &str = "/api/webhooks/media";

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Externally reachable base URL of the API, used for callback URLs
    pub public_base_url: String,
    /// HMAC key for continuation signatures; unsigned when unset
    pub webhook_signing_secret: Option<String>,
    /// Offset into a rendered clip at which the thumbnail frame is taken
    pub thumbnail_offset_secs: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:8000".to_string(),
            webhook_signing_secret: None,
            thumbnail_offset_secs: 1.0,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "http://localhost:8000".to_string()),
            webhook_signing_secret: std::env::var("WEBHOOK_SIGNING_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            thumbnail_offset_secs: std::env::var("THUMBNAIL_OFFSET_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.0),
        }
    }

    /// Absolute URL external services call back on.
    pub fn webhook_url(&self) -> String {
        format!(
            "{}{}",
            self.public_base_url.trim_end_matches('/'),
            MEDIA_WEBHOOK_PATH
        )
    }

    /// Frame offset for a clip of `duration` seconds, kept inside the clip.
    pub fn thumbnail_offset(&self, duration: f64) -> f64 {
        self.thumbnail_offset_secs.min(duration / 2.0).max(0.0)
    }
}
