//! Prediction API client (transcription, trim, thumbnail).

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::status::{AwaitStrategy, ExternalStatus};

/// Configuration for the prediction service.
#[derive(Debug, Clone)]
pub struct MediaApiConfig {
    /// Base URL of the prediction API
    pub base_url: String,
    /// Bearer token; calls fail fast when unset
    pub token: Option<String>,
    /// Model version used for transcription
    pub transcribe_version: String,
    /// Model version used for trimming clips
    pub trim_version: String,
    /// Model version used for thumbnail extraction
    pub thumbnail_version: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for MediaApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8002".to_string(),
            token: None,
            transcribe_version: "transcribe".to_string(),
            trim_version: "trim-video".to_string(),
            thumbnail_version: "video-thumbnail".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl MediaApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("MEDIA_API_URL").unwrap_or(defaults.base_url),
            token: std::env::var("MEDIA_API_TOKEN").ok().filter(|t| !t.is_empty()),
            transcribe_version: std::env::var("MEDIA_TRANSCRIBE_VERSION")
                .unwrap_or(defaults.transcribe_version),
            trim_version: std::env::var("MEDIA_TRIM_VERSION").unwrap_or(defaults.trim_version),
            thumbnail_version: std::env::var("MEDIA_THUMBNAIL_VERSION")
                .unwrap_or(defaults.thumbnail_version),
            timeout: Duration::from_secs(
                std::env::var("MEDIA_API_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}

#[derive(Debug, Serialize)]
struct CreatePrediction<'a> {
    version: &'a str,
    input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    webhook: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    webhook_events_filter: Option<[&'static str; 1]>,
}

/// A prediction as reported by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl Prediction {
    pub fn external_status(&self) -> ExternalStatus {
        ExternalStatus::parse(&self.status)
    }

    /// Error text, whatever shape the service used.
    pub fn error_message(&self) -> Option<String> {
        match &self.error {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

/// Client for the prediction service.
#[derive(Clone)]
pub struct PredictionClient {
    http: Client,
    config: MediaApiConfig,
}

impl PredictionClient {
    pub fn new(config: MediaApiConfig) -> ServiceResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ServiceError::Network)?;

        Ok(Self { http, config })
    }

    pub fn from_env() -> ServiceResult<Self> {
        Self::new(MediaApiConfig::from_env())
    }

    pub fn is_configured(&self) -> bool {
        self.config.token.is_some()
    }

    fn token(&self) -> ServiceResult<&str> {
        self.config
            .token
            .as_deref()
            .ok_or_else(|| ServiceError::not_configured("MEDIA_API_TOKEN not set"))
    }

    /// Start transcription of `audio_url` into SRT subtitles.
    pub async fn create_transcription(
        &self,
        audio_url: &str,
        strategy: &AwaitStrategy,
    ) -> ServiceResult<Prediction> {
        let input = json!({ "audio": audio_url, "format": "srt" });
        self.create(&self.config.transcribe_version, input, strategy).await
    }

    /// Start a trim of `video_url` between two `HH:MM:SS.mmm` timestamps.
    pub async fn create_trim(
        &self,
        video_url: &str,
        start_time: &str,
        end_time: &str,
        strategy: &AwaitStrategy,
    ) -> ServiceResult<Prediction> {
        let input = json!({
            "video": video_url,
            "start_time": start_time,
            "end_time": end_time,
            "output_format": "mp4",
        });
        self.create(&self.config.trim_version, input, strategy).await
    }

    /// Start extraction of a single frame at `timestamp`.
    pub async fn create_thumbnail(
        &self,
        video_url: &str,
        timestamp: &str,
        strategy: &AwaitStrategy,
    ) -> ServiceResult<Prediction> {
        let input = json!({ "video": video_url, "timestamp": timestamp });
        self.create(&self.config.thumbnail_version, input, strategy).await
    }

    /// Create a prediction and, for the polling strategy, wait for it.
    ///
    /// Creation is never retried: a duplicate would start a second job.
    pub async fn create(
        &self,
        version: &str,
        input: Value,
        strategy: &AwaitStrategy,
    ) -> ServiceResult<Prediction> {
        let token = self.token()?;
        let url = format!("{}/v1/predictions", self.config.base_url.trim_end_matches('/'));
        let webhook = strategy.webhook_url();
        let body = CreatePrediction {
            version,
            input,
            webhook,
            webhook_events_filter: webhook.map(|_| ["completed"]),
        };

        debug!(version = %version, callback = webhook.is_some(), "Creating prediction");

        let response = self.http.post(&url).bearer_auth(token).json(&body).send().await?;
        let prediction: Prediction = Self::parse(response).await?;
        metrics::counter!("mclip_predictions_created_total", "version" => version.to_string())
            .increment(1);
        info!(prediction_id = %prediction.id, version = %version, "Prediction created");

        match strategy {
            AwaitStrategy::Callback { .. } => Ok(prediction),
            AwaitStrategy::Poll { interval, timeout } => {
                self.await_completion(&prediction.id, *interval, *timeout).await
            }
        }
    }

    /// Fetch the current state of a prediction.
    pub async fn get_prediction(&self, id: &str) -> ServiceResult<Prediction> {
        let token = self.token()?;
        let url = format!(
            "{}/v1/predictions/{}",
            self.config.base_url.trim_end_matches('/'),
            id
        );
        let response = self.http.get(&url).bearer_auth(token).send().await?;
        Self::parse(response).await
    }

    /// Poll until the prediction is terminal. Transient poll errors are
    /// tolerated until the deadline.
    pub async fn await_completion(
        &self,
        id: &str,
        interval: Duration,
        timeout: Duration,
    ) -> ServiceResult<Prediction> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.get_prediction(id).await {
                Ok(prediction) if prediction.external_status().is_terminal() => {
                    return Ok(prediction);
                }
                Ok(prediction) => {
                    debug!(prediction_id = %id, status = %prediction.status, "Prediction still running");
                }
                Err(e) if e.is_retryable() => {
                    warn!(prediction_id = %id, "Poll failed, will retry: {}", e);
                }
                Err(e) => return Err(e),
            }

            if Instant::now() + interval > deadline {
                return Err(ServiceError::Timeout(timeout.as_secs()));
            }
            tokio::time::sleep(interval).await;
        }
    }

    async fn parse(response: reqwest::Response) -> ServiceResult<Prediction> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::RequestFailed {
                status: status.as_u16(),
                body,
            });
        }

        let prediction: Prediction = response.json().await?;
        if prediction.id.is_empty() {
            return Err(ServiceError::invalid_response("prediction has no id"));
        }
        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str) -> PredictionClient {
        PredictionClient::new(MediaApiConfig {
            base_url: base_url.to_string(),
            token: Some("secret".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_trim_registers_webhook() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/predictions"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(json!({
                "version": "trim-video",
                "input": {
                    "video": "https://cdn/v.mp4",
                    "start_time": "00:00:10.000",
                    "end_time": "00:00:40.000",
                    "output_format": "mp4"
                },
                "webhook": "https://api/hook?jobId=j",
                "webhook_events_filter": ["completed"]
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "p-1", "status": "starting"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let prediction = client(&server.uri())
            .create_trim(
                "https://cdn/v.mp4",
                "00:00:10.000",
                "00:00:40.000",
                &AwaitStrategy::callback("https://api/hook?jobId=j"),
            )
            .await
            .unwrap();

        assert_eq!(prediction.id, "p-1");
        assert_eq!(prediction.external_status(), ExternalStatus::Pending);
    }

    #[tokio::test]
    async fn test_poll_strategy_waits_for_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/predictions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "p-2", "status": "starting"
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/predictions/p-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "p-2", "status": "processing"
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/predictions/p-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "p-2", "status": "succeeded", "output": "https://out/thumb.jpg"
            })))
            .mount(&server)
            .await;

        let strategy = AwaitStrategy::Poll {
            interval: Duration::from_millis(5),
            timeout: Duration::from_secs(2),
        };
        let prediction = client(&server.uri())
            .create_thumbnail("https://cdn/v.mp4", "00:00:01.000", &strategy)
            .await
            .unwrap();

        assert_eq!(prediction.external_status(), ExternalStatus::Succeeded);
        assert_eq!(prediction.output, Some(json!("https://out/thumb.jpg")));
    }

    #[tokio::test]
    async fn test_poll_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/predictions/p-3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "p-3", "status": "processing"
            })))
            .mount(&server)
            .await;

        let result = client(&server.uri())
            .await_completion("p-3", Duration::from_millis(10), Duration::from_millis(30))
            .await;
        assert!(matches!(result, Err(ServiceError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_create_failure_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/predictions"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad input"))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .create_transcription("https://cdn/a.mp3", &AwaitStrategy::callback("https://h"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RequestFailed { status: 422, .. }));
    }

    #[tokio::test]
    async fn test_missing_token_fails_fast() {
        let client = PredictionClient::new(MediaApiConfig::default()).unwrap();
        assert!(!client.is_configured());
        let err = client
            .create_transcription("https://cdn/a.mp3", &AwaitStrategy::callback("https://h"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotConfigured(_)));
    }

    #[test]
    fn test_error_message_shapes() {
        let mut p = Prediction {
            id: "p".into(),
            status: "failed".into(),
            output: None,
            error: Some(json!("out of memory")),
        };
        assert_eq!(p.error_message().as_deref(), Some("out of memory"));
        p.error = Some(Value::Null);
        assert_eq!(p.error_message(), None);
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        std::env::set_var("MEDIA_API_URL", "https://media.example");
        std::env::set_var("MEDIA_API_TOKEN", "");
        std::env::set_var("MEDIA_TRIM_VERSION", "trim-v2");
        let config = MediaApiConfig::from_env();
        std::env::remove_var("MEDIA_API_URL");
        std::env::remove_var("MEDIA_API_TOKEN");
        std::env::remove_var("MEDIA_TRIM_VERSION");

        assert_eq!(config.base_url, "https://media.example");
        assert!(config.token.is_none());
        assert_eq!(config.trim_version, "trim-v2");
        assert_eq!(config.thumbnail_version, "video-thumbnail");
    }
}
