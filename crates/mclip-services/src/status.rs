//! External job status and awaiting strategies.

use std::time::Duration;

/// Status of an external prediction, normalized across providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
    Unknown,
}

impl ExternalStatus {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "starting" | "queued" => ExternalStatus::Pending,
            "processing" => ExternalStatus::Running,
            "succeeded" => ExternalStatus::Succeeded,
            "failed" => ExternalStatus::Failed,
            "canceled" | "cancelled" => ExternalStatus::Canceled,
            _ => ExternalStatus::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExternalStatus::Succeeded | ExternalStatus::Failed | ExternalStatus::Canceled
        )
    }

    /// Terminal without a usable result.
    pub fn is_failure(&self) -> bool {
        matches!(self, ExternalStatus::Failed | ExternalStatus::Canceled)
    }
}

/// How a caller waits for a prediction to finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwaitStrategy {
    /// Register a webhook; completion arrives as a separate request.
    Callback { webhook_url: String },
    /// Poll the prediction until it is terminal or the timeout elapses.
    Poll { interval: Duration, timeout: Duration },
}

impl AwaitStrategy {
    pub fn callback(webhook_url: impl Into<String>) -> Self {
        AwaitStrategy::Callback {
            webhook_url: webhook_url.into(),
        }
    }

    pub fn webhook_url(&self) -> Option<&str> {
        match self {
            AwaitStrategy::Callback { webhook_url } => Some(webhook_url),
            AwaitStrategy::Poll { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ExternalStatus::parse("starting"), ExternalStatus::Pending);
        assert_eq!(ExternalStatus::parse("queued"), ExternalStatus::Pending);
        assert_eq!(ExternalStatus::parse("processing"), ExternalStatus::Running);
        assert_eq!(ExternalStatus::parse("succeeded"), ExternalStatus::Succeeded);
        assert_eq!(ExternalStatus::parse("FAILED"), ExternalStatus::Failed);
        assert_eq!(ExternalStatus::parse("cancelled"), ExternalStatus::Canceled);
        assert_eq!(ExternalStatus::parse("canceled"), ExternalStatus::Canceled);
        assert_eq!(ExternalStatus::parse("exploded"), ExternalStatus::Unknown);
    }

    #[test]
    fn test_terminal_states() {
        assert!(ExternalStatus::Succeeded.is_terminal());
        assert!(ExternalStatus::Canceled.is_failure());
        assert!(!ExternalStatus::Running.is_terminal());
        assert!(!ExternalStatus::Unknown.is_terminal());
    }

    #[test]
    fn test_webhook_url() {
        assert_eq!(AwaitStrategy::callback("https://x/hook").webhook_url(), Some("https://x/hook"));
        let poll = AwaitStrategy::Poll {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(poll.webhook_url(), None);
    }
}
