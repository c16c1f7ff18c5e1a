//! Transcript parsing.
//!
//! Accepts subtitle blobs (`index / HH:MM:SS,mmm --> HH:MM:SS,mmm / text`),
//! plain prose, or an already-segmented JSON array, and produces ordered
//! timed segments. Malformed blocks are skipped, never fatal.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use mclip_models::timestamp::parse_timestamp;
use mclip_models::TranscriptSegment;

/// Time slot given to each sentence of a plain-text transcript.
pub const PLAIN_TEXT_SLOT_SECS: f64 = 5.0;

static BLOCK_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n").expect("valid block separator regex"));

static MARKUP_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));

/// A terminator only ends a sentence when followed by whitespace or the end
/// of text, so decimals and domains stay inside their sentence.
static SENTENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\S.*?(?:[.!?]+(?:\s|$)|$)").expect("valid sentence regex")
});

/// Raw transcript as delivered by the transcription service.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptInput {
    /// Subtitle blob or prose
    Text(String),
    /// Pre-segmented `{start, end, text}` entries
    Structured(Vec<Value>),
}

impl TranscriptInput {
    /// Interpret a webhook `output` value.
    ///
    /// Strings are text; arrays of objects are pre-segmented; arrays of
    /// strings use their first element; objects are searched for a
    /// `segments` array or a text-like field.
    pub fn from_output(output: &Value) -> Option<Self> {
        match output {
            Value::String(s) => Some(TranscriptInput::Text(s.clone())),
            Value::Array(items) => match items.first() {
                Some(Value::Object(_)) => Some(TranscriptInput::Structured(items.clone())),
                Some(first) => Self::from_output(first),
                None => None,
            },
            Value::Object(map) => {
                if let Some(Value::Array(segments)) = map.get("segments") {
                    return Some(TranscriptInput::Structured(segments.clone()));
                }
                ["transcription", "srt", "text", "output"]
                    .iter()
                    .find_map(|key| map.get(*key))
                    .and_then(Self::from_output)
            }
            _ => None,
        }
    }

    /// Text that should be fetched rather than parsed.
    pub fn remote_url(&self) -> Option<&str> {
        match self {
            TranscriptInput::Text(s) => {
                let s = s.trim();
                let is_url = (s.starts_with("https://") || s.starts_with("http://"))
                    && !s.contains(char::is_whitespace);
                is_url.then_some(s)
            }
            TranscriptInput::Structured(_) => None,
        }
    }
}

/// Parse any transcript input into ordered segments.
pub fn parse_transcript(input: &TranscriptInput) -> Vec<TranscriptSegment> {
    let mut segments = match input {
        TranscriptInput::Structured(entries) => parse_structured(entries),
        TranscriptInput::Text(text) if has_timestamp_line(text) => parse_subtitles(text),
        TranscriptInput::Text(text) => parse_plain_text(text, PLAIN_TEXT_SLOT_SECS),
    };
    segments.sort_by(|a, b| a.start.total_cmp(&b.start));
    segments
}

fn has_timestamp_line(text: &str) -> bool {
    text.lines().any(|line| parse_timing_line(line).is_some())
}

/// Parse `start --> end`, ignoring cue settings after the end timestamp.
fn parse_timing_line(line: &str) -> Option<(f64, f64)> {
    let (start, rest) = line.split_once("-->")?;
    let end = rest.split_whitespace().next()?;
    Some((parse_timestamp(start).ok()?, parse_timestamp(end).ok()?))
}

/// Subtitle mode.
pub fn parse_subtitles(text: &str) -> Vec<TranscriptSegment> {
    let normalized = text.replace("\r\n", "\n");

    BLOCK_SEPARATOR
        .split(&normalized)
        .filter_map(|block| {
            let lines: Vec<&str> = block.lines().map(str::trim).collect();
            let timing_idx = lines.iter().position(|l| l.contains("-->"))?;
            let (start, end) = parse_timing_line(lines[timing_idx])?;

            let body: Vec<String> = lines[timing_idx + 1..]
                .iter()
                .map(|l| MARKUP_TAG.replace_all(l, "").trim().to_string())
                .filter(|l| !l.is_empty())
                .collect();
            let segment = TranscriptSegment::new(start, end, body.join(" "));
            segment.is_well_formed().then_some(segment)
        })
        .collect()
}

/// Plain-text mode: one fixed slot per sentence on a running clock.
pub fn parse_plain_text(text: &str, slot_secs: f64) -> Vec<TranscriptSegment> {
    let mut clock = 0.0;
    SENTENCE
        .find_iter(text)
        .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| s.chars().any(char::is_alphanumeric))
        .map(|sentence| {
            let segment = TranscriptSegment::new(clock, clock + slot_secs, sentence);
            clock += slot_secs;
            segment
        })
        .collect()
}

/// Pre-segmented mode; entries without numeric bounds or text are skipped.
pub fn parse_structured(entries: &[Value]) -> Vec<TranscriptSegment> {
    entries
        .iter()
        .filter_map(|entry| {
            let start = entry.get("start").and_then(Value::as_f64)?;
            let end = entry.get("end").and_then(Value::as_f64)?;
            let text = entry.get("text").and_then(Value::as_str)?.trim();
            let segment = TranscriptSegment::new(start, end, text);
            (start >= 0.0 && segment.is_well_formed()).then_some(segment)
        })
        .collect()
}
