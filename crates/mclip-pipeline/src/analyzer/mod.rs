//! Moment analysis.
//!
//! Each strategy implements [`MomentAnalyzer`]. [`AnalyzerChain`] tries them
//! in order and [`accept_moments`] post-processes whichever list wins, so the
//! acceptance rules live in exactly one place.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use mclip_models::{GenerationContext, Moment, TranscriptSegment};

use crate::error::{PipelineError, PipelineResult};
use crate::metrics::record_analyzer_run;

pub mod gemini;
pub mod keyword;

pub use gemini::{GeminiAnalyzer, GeminiConfig};
pub use keyword::KeywordAnalyzer;

/// Accepted clip durations, as multiples of the target duration.
pub const ACCEPT_BAND: (f64, f64) = (0.5, 1.5);

/// Everything an analyzer needs for one pass.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisInput<'a> {
    pub segments: &'a [TranscriptSegment],
    pub context: &'a GenerationContext,
    /// Effective video duration in seconds (0 when unknown)
    pub video_duration: f64,
}

/// A strategy for finding marketing moments in a transcript.
#[async_trait]
pub trait MomentAnalyzer: Send + Sync {
    /// Name recorded in the job's analysis snapshot.
    fn name(&self) -> &'static str;

    /// Propose candidate moments. Output is unfiltered; callers apply
    /// [`accept_moments`].
    async fn analyze(&self, input: &AnalysisInput<'_>) -> PipelineResult<Vec<Moment>>;
}

/// Result of running the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    pub analyzer: &'static str,
    pub moments: Vec<Moment>,
}

/// Ordered analyzers; the first one with accepted output wins.
#[derive(Clone)]
pub struct AnalyzerChain {
    analyzers: Vec<Arc<dyn MomentAnalyzer>>,
}

impl AnalyzerChain {
    pub fn new(analyzers: Vec<Arc<dyn MomentAnalyzer>>) -> Self {
        Self { analyzers }
    }

    /// Gemini first when configured, keyword heuristic always last.
    pub fn from_config(gemini: GeminiConfig) -> PipelineResult<Self> {
        let mut analyzers: Vec<Arc<dyn MomentAnalyzer>> = Vec::new();
        if gemini.is_configured() {
            analyzers.push(Arc::new(GeminiAnalyzer::new(gemini)?));
        } else {
            info!("GEMINI_API_KEY not set, using keyword analyzer only");
        }
        analyzers.push(Arc::new(KeywordAnalyzer::new()));
        Ok(Self::new(analyzers))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.analyzers.iter().map(|a| a.name()).collect()
    }

    /// Run analyzers in order until one yields accepted moments.
    ///
    /// An empty result from every analyzer is `Ok` with no moments; an
    /// error is returned only when every analyzer failed.
    pub async fn run(&self, input: &AnalysisInput<'_>) -> PipelineResult<ChainOutcome> {
        let mut last_empty: Option<&'static str> = None;
        let mut last_error: Option<PipelineError> = None;

        for analyzer in &self.analyzers {
            let name = analyzer.name();
            match analyzer.analyze(input).await {
                Ok(raw) => {
                    let proposed = raw.len();
                    let moments = accept_moments(raw, input.context, input.video_duration);
                    if !moments.is_empty() {
                        info!(analyzer = name, proposed, accepted = moments.len(), "Analysis accepted");
                        record_analyzer_run(name, "accepted");
                        return Ok(ChainOutcome { analyzer: name, moments });
                    }
                    warn!(analyzer = name, proposed, "Analyzer produced no acceptable moments");
                    record_analyzer_run(name, "empty");
                    last_empty = Some(name);
                }
                Err(e) => {
                    warn!(analyzer = name, "Analyzer failed, falling back: {}", e);
                    record_analyzer_run(name, "error");
                    last_error = Some(e);
                }
            }
        }

        match (last_empty, last_error) {
            (Some(analyzer), _) => Ok(ChainOutcome {
                analyzer,
                moments: Vec::new(),
            }),
            (None, Some(e)) => Err(e),
            (None, None) => Err(PipelineError::analysis_failed("no analyzers configured")),
        }
    }
}

/// Acceptance post-processing shared by every strategy.
///
/// Clamps into `[0, video_duration]` (no upper bound when the duration is
/// unknown), drops empty or out-of-band ranges, stable-sorts by overall
/// score and caps the list at `max_clips`.
pub fn accept_moments(
    moments: Vec<Moment>,
    context: &GenerationContext,
    video_duration: f64,
) -> Vec<Moment> {
    let (min_len, max_len) = context.duration_band(ACCEPT_BAND.0, ACCEPT_BAND.1);
    let upper = if video_duration > 0.0 { video_duration } else { f64::INFINITY };

    let mut accepted: Vec<Moment> = moments
        .into_iter()
        .filter(|m| m.start_time.is_finite() && m.end_time.is_finite())
        .map(|mut m| {
            m.start_time = m.start_time.clamp(0.0, upper);
            m.end_time = m.end_time.clamp(0.0, upper);
            m
        })
        .filter(|m| m.end_time > m.start_time)
        .filter(|m| (min_len..=max_len).contains(&m.duration()))
        .collect();

    accepted.sort_by(|a, b| b.scores.overall.cmp(&a.scores.overall));
    accepted.truncate(context.max_clips as usize);
    accepted
}
