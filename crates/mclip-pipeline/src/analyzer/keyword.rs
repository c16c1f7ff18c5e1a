//! Deterministic keyword heuristic.
//!
//! Scores each segment against fixed marketing cue lists. Same transcript in,
//! same moments out: the only variation is a jitter derived from a SHA-256 of
//! the segment index and text.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use mclip_models::{Moment, MomentScores, MomentType, TranscriptSegment};

use super::{AnalysisInput, MomentAnalyzer};
use crate::error::PipelineResult;

/// Seconds added after a segment so the clip does not cut mid-breath.
const END_PAD_SECS: f64 = 2.0;

/// Heuristic clip length band, as multiples of the target.
const LENGTH_BAND: (f64, f64) = (0.8, 1.2);

/// Upper bound (exclusive) of the per-segment jitter.
const MAX_JITTER: f64 = 3.0;

struct Category {
    moment_type: MomentType,
    base_score: f64,
    /// Offsets applied to `(hook, emotional, conversion)` from the overall score
    offsets: (f64, f64, f64),
    cues: &'static [&'static str],
}

const CATEGORIES: &[Category] = &[
    Category {
        moment_type: MomentType::Hook,
        base_score: 88.0,
        offsets: (6.0, -4.0, -10.0),
        cues: &[
            "did you know", "imagine", "what if", "secret", "the truth", "here's why",
            "stop scrolling", "you won't believe", "biggest mistake", "nobody tells you",
        ],
    },
    Category {
        moment_type: MomentType::Testimonial,
        base_score: 85.0,
        offsets: (-8.0, 8.0, -2.0),
        cues: &[
            "changed my life", "i was skeptical", "i used to", "i tried", "my experience",
            "i love", "i recommend", "honestly", "before and after",
        ],
    },
    Category {
        moment_type: MomentType::CallToAction,
        base_score: 87.0,
        offsets: (-10.0, -6.0, 8.0),
        cues: &[
            "sign up", "buy now", "click", "order", "subscribe", "get started", "download",
            "join", "link in", "try it", "shop", "book a",
        ],
    },
    Category {
        moment_type: MomentType::SocialProof,
        base_score: 82.0,
        offsets: (-6.0, 2.0, 4.0),
        cues: &[
            "thousands of", "millions of", "customers", "five star", "5 star", "rated",
            "reviews", "trusted by", "best-selling", "award",
        ],
    },
    Category {
        moment_type: MomentType::Urgency,
        base_score: 84.0,
        offsets: (-4.0, 4.0, 6.0),
        cues: &[
            "limited", "today only", "right now", "hurry", "last chance", "ends soon",
            "don't miss", "while supplies last", "deadline", "only a few",
        ],
    },
    Category {
        moment_type: MomentType::Benefit,
        base_score: 80.0,
        offsets: (-6.0, 0.0, 5.0),
        cues: &[
            "save", "free", "easy", "faster", "results", "guarantee", "improve", "boost",
            "without", "in minutes",
        ],
    },
];

/// Whether `phrase` occurs in `text` on word boundaries.
fn contains_phrase(text: &str, phrase: &str) -> bool {
    text.match_indices(phrase).any(|(idx, _)| {
        let before = text[..idx].chars().next_back();
        let after = text[idx + phrase.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Deterministic jitter in `[0, MAX_JITTER)`.
fn jitter(index: usize, text: &str) -> f64 {
    let digest = Sha256::digest(format!("{}:{}", index, text).as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    let n = u64::from_be_bytes(bytes) % 3000;
    n as f64 / 1000.0 * (MAX_JITTER / 3.0)
}

fn caption_from(text: &str) -> String {
    const MAX_CHARS: usize = 100;
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(MAX_CHARS).collect();
    match cut.rfind(' ') {
        Some(idx) => format!("{}...", &cut[..idx]),
        None => format!("{}...", cut),
    }
}

/// Keyword heuristic analyzer.
#[derive(Debug, Clone, Default)]
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Best-scoring category for one segment, if any cue matches.
    fn score_segment(
        index: usize,
        segment: &TranscriptSegment,
        input: &AnalysisInput<'_>,
    ) -> Option<Moment> {
        let lowered = segment.text.to_lowercase();
        let (category, matched) = CATEGORIES
            .iter()
            .filter_map(|c| {
                let matched: Vec<&str> = c
                    .cues
                    .iter()
                    .copied()
                    .filter(|cue| contains_phrase(&lowered, cue))
                    .collect();
                (!matched.is_empty()).then_some((c, matched))
            })
            .max_by(|(a, _), (b, _)| a.base_score.total_cmp(&b.base_score))?;

        let overall = category.base_score + jitter(index, &segment.text);
        let (hook, emotional, conversion) = category.offsets;

        let (min_len, max_len) = input.context.duration_band(LENGTH_BAND.0, LENGTH_BAND.1);
        let length = (segment.end + END_PAD_SECS - segment.start).clamp(min_len, max_len);
        let mut start = segment.start;
        let mut end = start + length;
        // Slide back rather than truncate when the window runs past the end.
        if input.video_duration > 0.0 && end > input.video_duration {
            end = input.video_duration;
            start = (end - length).max(0.0);
        }

        Some(Moment {
            start_time: start,
            end_time: end,
            moment_type: category.moment_type,
            scores: MomentScores::clamped(
                overall + hook,
                overall + emotional,
                overall + conversion,
                overall,
            ),
            why_selected: format!(
                "Matched {} cues: {}",
                category.moment_type.as_str().replace('_', " "),
                matched.join(", ")
            ),
            suggested_caption: caption_from(&segment.text),
            transcript_excerpt: segment.text.clone(),
        })
    }
}

#[async_trait]
impl MomentAnalyzer for KeywordAnalyzer {
    fn name(&self) -> &'static str {
        "keyword"
    }

    async fn analyze(&self, input: &AnalysisInput<'_>) -> PipelineResult<Vec<Moment>> {
        let mut candidates: Vec<Moment> = input
            .segments
            .iter()
            .enumerate()
            .filter_map(|(i, segment)| Self::score_segment(i, segment, input))
            .collect();

        candidates.sort_by(|a, b| b.scores.overall.cmp(&a.scores.overall));

        let mut selected: Vec<Moment> = Vec::new();
        for candidate in candidates {
            if selected.len() >= input.context.max_clips as usize {
                break;
            }
            if selected.iter().all(|kept| !kept.overlaps(&candidate)) {
                selected.push(candidate);
            }
        }
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::accept_moments;
    use mclip_models::GenerationContext;

    fn segments() -> Vec<TranscriptSegment> {
        vec![
            TranscriptSegment::new(0.0, 6.0, "Did you know most runners quit in week two?"),
            TranscriptSegment::new(40.0, 46.0, "The weather was nice that day."),
            TranscriptSegment::new(80.0, 86.0, "Sign up today and your first month is free."),
            TranscriptSegment::new(120.0, 126.0, "I was skeptical but it changed my life."),
            TranscriptSegment::new(160.0, 166.0, "Join thousands of customers. Hurry, ends soon!"),
        ]
    }

    async fn run(ctx: &GenerationContext, segments: &[TranscriptSegment], duration: f64) -> Vec<Moment> {
        KeywordAnalyzer::new()
            .analyze(&AnalysisInput {
                segments,
                context: ctx,
                video_duration: duration,
            })
            .await
            .unwrap()
    }

    #[test]
    fn test_word_boundaries() {
        assert!(contains_phrase("click the link", "click"));
        assert!(!contains_phrase("clicker game", "click"));
        assert!(contains_phrase("it's free!", "free"));
        assert!(!contains_phrase("freedom", "free"));
    }

    #[test]
    fn test_jitter_is_deterministic_and_bounded() {
        for i in 0..200 {
            let j = jitter(i, "same text");
            assert_eq!(j, jitter(i, "same text"));
            assert!((0.0..MAX_JITTER).contains(&j));
        }
    }

    #[tokio::test]
    async fn test_categories_and_discard() {
        let ctx = GenerationContext::default();
        let moments = run(&ctx, &segments(), 300.0).await;

        assert_eq!(moments.len(), 4);
        let types: Vec<MomentType> = moments.iter().map(|m| m.moment_type).collect();
        assert!(types.contains(&MomentType::Hook));
        assert!(types.contains(&MomentType::CallToAction));
        assert!(types.contains(&MomentType::Testimonial));
        // Urgency (84) beats social proof (82) on the mixed segment.
        assert!(types.contains(&MomentType::Urgency));
        assert!(moments.iter().all(|m| !m.transcript_excerpt.contains("weather")));
    }

    #[tokio::test]
    async fn test_lengths_within_band_and_sorted() {
        let ctx = GenerationContext::default();
        let moments = run(&ctx, &segments(), 300.0).await;

        for m in &moments {
            assert!((24.0..=36.0).contains(&m.duration()), "duration {}", m.duration());
        }
        assert!(moments.windows(2).all(|w| w[0].scores.overall >= w[1].scores.overall));
        assert_eq!(moments[0].moment_type, MomentType::Hook);
    }

    #[tokio::test]
    async fn test_overlaps_suppressed_and_capped() {
        let ctx = GenerationContext {
            max_clips: 2,
            ..Default::default()
        };
        let dense: Vec<TranscriptSegment> = (0..10)
            .map(|i| TranscriptSegment::new(i as f64 * 5.0, i as f64 * 5.0 + 4.0, "Buy now, limited offer"))
            .collect();
        let moments = run(&ctx, &dense, 0.0).await;

        assert_eq!(moments.len(), 2);
        assert!(!moments[0].overlaps(&moments[1]));
    }

    #[tokio::test]
    async fn test_window_slides_back_at_video_end() {
        let ctx = GenerationContext::default();
        let tail = vec![TranscriptSegment::new(95.0, 99.0, "Subscribe for more")];
        let moments = run(&ctx, &tail, 100.0).await;

        assert_eq!(moments[0].end_time, 100.0);
        assert_eq!(moments[0].start_time, 76.0);
    }

    #[tokio::test]
    async fn test_deterministic_and_accepted_unchanged() {
        let ctx = GenerationContext::default();
        let first = run(&ctx, &segments(), 300.0).await;
        let second = run(&ctx, &segments(), 300.0).await;
        assert_eq!(first, second);

        let accepted = accept_moments(first.clone(), &ctx, 300.0);
        assert_eq!(accepted, first);
    }

    #[test]
    fn test_caption_truncates_on_word() {
        let long = "word ".repeat(40);
        let caption = caption_from(&long);
        assert!(caption.ends_with("..."));
        assert!(caption.chars().count() <= 103);
    }
}
