//! Analyzer moments: candidate time ranges with marketing value.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Marketing category of a moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MomentType {
    Hook,
    Testimonial,
    CallToAction,
    SocialProof,
    Urgency,
    Benefit,
    #[serde(other)]
    Other,
}

impl MomentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MomentType::Hook => "hook",
            MomentType::Testimonial => "testimonial",
            MomentType::CallToAction => "call_to_action",
            MomentType::SocialProof => "social_proof",
            MomentType::Urgency => "urgency",
            MomentType::Benefit => "benefit",
            MomentType::Other => "other",
        }
    }

    /// Lenient parse for free-form labels returned by language models.
    ///
    /// Accepts any casing and `-`, `_` or space separators, plus the
    /// common `cta` abbreviation.
    pub fn from_label(label: &str) -> Self {
        let normalized: String = label
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();

        match normalized.as_str() {
            "hook" => MomentType::Hook,
            "testimonial" => MomentType::Testimonial,
            "cta" | "call_to_action" => MomentType::CallToAction,
            "social_proof" => MomentType::SocialProof,
            "urgency" | "scarcity" => MomentType::Urgency,
            "benefit" | "value_proposition" => MomentType::Benefit,
            _ => MomentType::Other,
        }
    }
}

impl std::fmt::Display for MomentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Independent 0-100 scores for one moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct MomentScores {
    pub hook_strength: u8,
    pub emotional_impact: u8,
    pub conversion_potential: u8,
    /// Overall marketing score, used for ranking
    pub overall: u8,
}

impl MomentScores {
    /// Build scores from raw floating point values, clamping into 0-100.
    pub fn clamped(hook: f64, emotional: f64, conversion: f64, overall: f64) -> Self {
        Self {
            hook_strength: clamp_score(hook),
            emotional_impact: clamp_score(emotional),
            conversion_potential: clamp_score(conversion),
            overall: clamp_score(overall),
        }
    }
}

fn clamp_score(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

/// A candidate moment produced by an analyzer, before it becomes a clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Moment {
    /// Start time in seconds
    pub start_time: f64,
    /// End time in seconds
    pub end_time: f64,
    pub moment_type: MomentType,
    pub scores: MomentScores,
    /// Human-readable selection rationale
    pub why_selected: String,
    pub suggested_caption: String,
    pub transcript_excerpt: String,
}

impl Moment {
    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Whether the two moments share any time range.
    pub fn overlaps(&self, other: &Moment) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }
}
