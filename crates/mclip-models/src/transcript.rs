//! Timed transcript segments.

use serde::{Deserialize, Serialize};

/// One timed piece of transcript text.
///
/// Produced by the transcript parser and consumed within a single
/// analysis pass; never persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    pub text: String,
}

impl TranscriptSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Well-formed segments have positive duration and non-empty text.
    pub fn is_well_formed(&self) -> bool {
        self.end > self.start && !self.text.trim().is_empty()
    }
}
