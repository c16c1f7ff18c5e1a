//! Timestamp parsing and formatting utilities.
//!
//! Supports the `HH:MM:SS`, `HH:MM:SS.mmm`, `HH:MM:SS,mmm` (subtitle),
//! `MM:SS` and plain-seconds forms.

use thiserror::Error;

/// Maximum reasonable video duration (24 hours in seconds).
pub const MAX_VIDEO_DURATION_SECS: f64 = 86400.0;

/// Timestamp parsing error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("Timestamp cannot be empty")]
    Empty,

    #[error("Timestamp cannot be negative")]
    Negative,

    #[error("Invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("Invalid timestamp format '{0}'. Use HH:MM:SS, HH:MM:SS.mmm, MM:SS, or SS")]
    InvalidFormat(String),

    #[error("Timestamp exceeds maximum allowed duration")]
    ExceedsMaxDuration,
}

/// Parse a timestamp string to total seconds.
///
/// # Examples
/// ```
/// use mclip_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("01:30:00").unwrap(), 5400.0);
/// assert_eq!(parse_timestamp("00:00:01,500").unwrap(), 1.5);
/// assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    // Subtitle files use a comma before the milliseconds.
    let normalized = ts.replace(',', ".");
    let parts: Vec<&str> = normalized.split(':').collect();

    let component = |name: &'static str, raw: &str| -> Result<f64, TimestampError> {
        let value: f64 = raw
            .parse()
            .map_err(|_| TimestampError::InvalidValue(name, raw.to_string()))?;
        if !value.is_finite() {
            return Err(TimestampError::InvalidValue(name, raw.to_string()));
        }
        if value < 0.0 {
            return Err(TimestampError::Negative);
        }
        Ok(value)
    };

    let total = match parts.as_slice() {
        [s] => component("seconds", s)?,
        [m, s] => component("minutes", m)? * 60.0 + component("seconds", s)?,
        [h, m, s] => {
            component("hours", h)? * 3600.0 + component("minutes", m)? * 60.0 + component("seconds", s)?
        }
        _ => return Err(TimestampError::InvalidFormat(ts.to_string())),
    };

    if total > MAX_VIDEO_DURATION_SECS {
        return Err(TimestampError::ExceedsMaxDuration);
    }
    Ok(total)
}

/// Format seconds as `HH:MM:SS.mmm`, the form render services expect.
pub fn format_seconds(total_secs: f64) -> String {
    let total_millis = (total_secs.max(0.0) * 1000.0).round() as u64;
    let hours = total_millis / 3_600_000;
    let mins = (total_millis % 3_600_000) / 60_000;
    let secs = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;
    format!("{:02}:{:02}:{:02}.{:03}", hours, mins, secs, millis)
}
