//! Input validation for user-supplied source URLs and free text.
//!
//! Source URLs are handed to the resolver and the media service, so anything
//! pointing at loopback, private ranges or cloud metadata is refused here.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;
use url::Url;

/// Maximum URL length.
pub const MAX_URL_LENGTH: usize = 2048;

static BLOCKED_HOSTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^127\.",
        r"^localhost$",
        r"^0\.0\.0\.0$",
        r"^10\.",
        r"^172\.(1[6-9]|2[0-9]|3[0-1])\.",
        r"^192\.168\.",
        r"^169\.254\.",
        r"^\[::1\]$",
        r"^\[f[cd]",
        r"^\[fe80",
        r"^metadata\.",
        r"\.internal$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid blocked host regex"))
    .collect()
});

/// Why a source URL was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlRejection {
    Empty,
    TooLong,
    Malformed(String),
    Scheme(String),
    Blocked,
}

impl std::fmt::Display for UrlRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "URL cannot be empty"),
            Self::TooLong => write!(f, "URL exceeds maximum length of {} characters", MAX_URL_LENGTH),
            Self::Malformed(e) => write!(f, "Invalid URL format: {}", e),
            Self::Scheme(s) => write!(f, "Invalid protocol '{}'. Only HTTP and HTTPS are allowed.", s),
            Self::Blocked => write!(f, "URL appears to target an internal or restricted endpoint"),
        }
    }
}

/// Validate a source URL and return it trimmed.
pub fn validate_source_url(raw: &str) -> Result<String, UrlRejection> {
    let url = raw.trim();
    if url.is_empty() {
        return Err(UrlRejection::Empty);
    }
    if url.len() > MAX_URL_LENGTH {
        return Err(UrlRejection::TooLong);
    }

    let parsed = Url::parse(url).map_err(|e| UrlRejection::Malformed(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(UrlRejection::Scheme(parsed.scheme().to_string()));
    }

    let host = parsed
        .host_str()
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| UrlRejection::Malformed("URL must have a host".to_string()))?;
    if BLOCKED_HOSTS.iter().any(|re| re.is_match(&host)) {
        warn!(host = %host, "Blocked source URL host");
        return Err(UrlRejection::Blocked);
    }

    Ok(url.to_string())
}

/// Strip control characters (other than newline and tab) and trim.
pub fn sanitize_text(input: &str) -> String {
    input
        .trim()
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}
