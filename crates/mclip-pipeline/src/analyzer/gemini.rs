//! Gemini-backed moment analyzer.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use mclip_models::timestamp::parse_timestamp;
use mclip_models::{Moment, MomentScores, MomentType};

use super::{AnalysisInput, MomentAnalyzer};
use crate::error::{PipelineError, PipelineResult};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODELS: &[&str] = &["gemini-2.5-flash", "gemini-2.5-flash-lite", "gemini-2.5-pro"];

/// Gemini API configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Models tried in order
    pub models: Vec<String>,
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            timeout: Duration::from_secs(90),
        }
    }
}

impl GeminiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()),
            base_url: std::env::var("GEMINI_BASE_URL")
                .ok()
                .filter(|u| !u.is_empty())
                .unwrap_or(defaults.base_url),
            models: std::env::var("GEMINI_MODELS")
                .ok()
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|m| !m.is_empty())
                        .map(str::to_string)
                        .collect::<Vec<_>>()
                })
                .filter(|models| !models.is_empty())
                .unwrap_or(defaults.models),
            timeout: defaults.timeout,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct MomentsPayload {
    #[serde(default)]
    moments: Vec<RawMoment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMoment {
    #[serde(default)]
    start_time: Value,
    #[serde(default)]
    end_time: Value,
    #[serde(rename = "type", default)]
    moment_type: String,
    #[serde(default)]
    scores: RawScores,
    #[serde(default)]
    why_selected: String,
    #[serde(default)]
    suggested_caption: String,
    #[serde(default)]
    transcript_excerpt: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawScores {
    #[serde(default)]
    hook_strength: f64,
    #[serde(default)]
    emotional_impact: f64,
    #[serde(default)]
    conversion_potential: f64,
    #[serde(default)]
    overall_score: f64,
}

/// Seconds from a number or a timestamp string.
fn seconds(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_timestamp(s).ok(),
        _ => None,
    }
}

impl RawMoment {
    fn into_moment(self) -> Option<Moment> {
        Some(Moment {
            start_time: seconds(&self.start_time)?,
            end_time: seconds(&self.end_time)?,
            moment_type: MomentType::from_label(&self.moment_type),
            scores: MomentScores::clamped(
                self.scores.hook_strength,
                self.scores.emotional_impact,
                self.scores.conversion_potential,
                self.scores.overall_score,
            ),
            why_selected: self.why_selected,
            suggested_caption: self.suggested_caption,
            transcript_excerpt: self.transcript_excerpt,
        })
    }
}

/// Strip a surrounding markdown code fence, if any.
fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag on the opening line.
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse the model's JSON text into moments. Entries with unusable times
/// are dropped.
fn parse_moments(text: &str) -> PipelineResult<Vec<Moment>> {
    let payload: MomentsPayload = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| PipelineError::analysis_failed(format!("Failed to parse moments JSON: {}", e)))?;
    Ok(payload
        .moments
        .into_iter()
        .filter_map(RawMoment::into_moment)
        .collect())
}

/// Analyzer that asks Gemini for structured moments.
pub struct GeminiAnalyzer {
    config: GeminiConfig,
    api_key: String,
    client: Client,
}

impl GeminiAnalyzer {
    pub fn new(config: GeminiConfig) -> PipelineResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| PipelineError::config_error("GEMINI_API_KEY not set"))?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(PipelineError::Http)?;

        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    fn build_prompt(input: &AnalysisInput<'_>) -> String {
        let ctx = input.context;
        let (low, high) = ctx.duration_band(0.7, 1.3);
        let listing: String = input
            .segments
            .iter()
            .map(|s| format!("[{:.2}-{:.2}] {}\n", s.start, s.end, s.text))
            .collect();

        format!(
            r#"You are a performance-marketing editor. Find the moments in this video
transcript that would make the highest-converting short ad clips.

Industry: {industry}
Product: {product}
Target audience: {audience}
Target clip duration: {target:.0} seconds (acceptable {low:.0}-{high:.0} seconds)
Maximum clips: {max_clips}
Video duration: {duration:.1} seconds

Return ONLY a JSON object with this schema:
{{
  "moments": [
    {{
      "startTime": 12.5,
      "endTime": 41.0,
      "type": "hook | testimonial | call_to_action | social_proof | urgency | benefit",
      "scores": {{
        "hookStrength": 0,
        "emotionalImpact": 0,
        "conversionPotential": 0,
        "overallScore": 0
      }},
      "whySelected": "Why this moment converts",
      "suggestedCaption": "Caption for the ad",
      "transcriptExcerpt": "Exact words from the transcript"
    }}
  ]
}}

Rules:
- Times are seconds from the start of the video and must come from the transcript below.
- Scores are integers from 1 to 100.
- Moments must not overlap.

TRANSCRIPT:
{listing}"#,
            industry = ctx.industry,
            product = ctx.product_description,
            audience = ctx.target_audience,
            target = ctx.target_clip_duration,
            max_clips = ctx.max_clips,
            duration = input.video_duration,
        )
    }

    async fn call_model(&self, model: &str, prompt: &str) -> PipelineResult<Vec<Moment>> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.config.base_url.trim_end_matches('/'),
            model,
            self.api_key
        );

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::analysis_failed(format!("Gemini API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::analysis_failed(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            PipelineError::analysis_failed(format!("Failed to parse Gemini response: {}", e))
        })?;

        let text = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| PipelineError::analysis_failed("No content in Gemini response"))?;

        parse_moments(text)
    }
}

#[async_trait]
impl MomentAnalyzer for GeminiAnalyzer {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn analyze(&self, input: &AnalysisInput<'_>) -> PipelineResult<Vec<Moment>> {
        let prompt = Self::build_prompt(input);
        debug!(segments = input.segments.len(), "Built Gemini prompt");

        let mut last_error = None;
        for model in &self.config.models {
            match self.call_model(model, &prompt).await {
                Ok(moments) => {
                    info!(model = %model, moments = moments.len(), "Gemini analysis succeeded");
                    return Ok(moments);
                }
                Err(e) => {
                    warn!(model = %model, "Gemini model failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| PipelineError::analysis_failed("No Gemini models configured")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mclip_models::{GenerationContext, TranscriptSegment};
    use serde_json::json;
    use serial_test::serial;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn analyzer(base_url: &str, models: &[&str]) -> GeminiAnalyzer {
        GeminiAnalyzer::new(GeminiConfig {
            api_key: Some("test-key".to_string()),
            base_url: base_url.to_string(),
            models: models.iter().map(|m| m.to_string()).collect(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn model_reply(text: &str) -> serde_json::Value {
        json!({"candidates": [{"content": {"parts": [{"text": text}]}}]})
    }

    const MOMENTS: &str = r#"{"moments":[{"startTime":5,"endTime":35.5,"type":"CTA","scores":{"hookStrength":70,"emotionalImpact":140,"conversionPotential":95,"overallScore":91},"whySelected":"Direct ask","suggestedCaption":"Grab it","transcriptExcerpt":"buy now"},{"startTime":"00:01:00","endTime":"00:01:30","type":"hook","scores":{"overallScore":80}},{"startTime":null,"endTime":3,"type":"hook"}]}"#;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {}  "), "{}");
    }

    #[test]
    fn test_parse_moments_clamps_and_converts() {
        let moments = parse_moments(&format!("```json\n{}\n```", MOMENTS)).unwrap();
        assert_eq!(moments.len(), 2);

        assert_eq!(moments[0].moment_type, MomentType::CallToAction);
        assert_eq!(moments[0].scores.emotional_impact, 100);
        assert_eq!(moments[0].scores.overall, 91);
        assert_eq!(moments[0].end_time, 35.5);

        assert_eq!((moments[1].start_time, moments[1].end_time), (60.0, 90.0));
        assert_eq!(moments[1].scores.hook_strength, 0);
    }

    #[test]
    fn test_parse_moments_rejects_garbage() {
        assert!(parse_moments("not json").is_err());
    }

    #[test]
    fn test_prompt_embeds_context_and_segments() {
        let ctx = GenerationContext {
            industry: "fitness".into(),
            product_description: "running app".into(),
            target_audience: "new runners".into(),
            ..Default::default()
        };
        let segments = vec![TranscriptSegment::new(1.0, 4.0, "Start running today")];
        let prompt = GeminiAnalyzer::build_prompt(&AnalysisInput {
            segments: &segments,
            context: &ctx,
            video_duration: 120.0,
        });

        assert!(prompt.contains("Industry: fitness"));
        assert!(prompt.contains("Maximum clips: 5"));
        assert!(prompt.contains("[1.00-4.00] Start running today"));
        assert!(prompt.contains("acceptable 21-39 seconds"));
    }

    #[tokio::test]
    async fn test_falls_back_to_next_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/first:generateContent"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/models/second:generateContent"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(model_reply(MOMENTS)))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = GenerationContext::default();
        let moments = analyzer(&server.uri(), &["first", "second"])
            .analyze(&AnalysisInput {
                segments: &[],
                context: &ctx,
                video_duration: 100.0,
            })
            .await
            .unwrap();
        assert_eq!(moments.len(), 2);
    }

    #[tokio::test]
    async fn test_all_models_failing_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(model_reply("I cannot help")))
            .mount(&server)
            .await;

        let ctx = GenerationContext::default();
        let result = analyzer(&server.uri(), &["only"])
            .analyze(&AnalysisInput {
                segments: &[],
                context: &ctx,
                video_duration: 100.0,
            })
            .await;
        assert!(matches!(result, Err(PipelineError::AnalysisFailed(_))));
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        std::env::set_var("GEMINI_API_KEY", "k");
        std::env::set_var("GEMINI_MODELS", "a, b,,");
        let config = GeminiConfig::from_env();
        std::env::remove_var("GEMINI_API_KEY");
        std::env::remove_var("GEMINI_MODELS");

        assert!(config.is_configured());
        assert_eq!(config.models, vec!["a", "b"]);
    }
}
