//! User notifications emitted when a job finishes.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::JobId;

/// Kind of notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ClipJobCompleted,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::ClipJobCompleted => "clip_job_completed",
        }
    }
}

/// Persisted notification record, also broadcast on the user's event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub entity_id: String,
    pub entity_type: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Summary notification for a finished clip job.
    pub fn job_completed(user_id: impl Into<String>, job_id: &JobId, succeeded: usize, total: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            notification_type: NotificationType::ClipJobCompleted,
            title: "Your clips are ready".to_string(),
            message: format!("{} of {} clips succeeded", succeeded, total),
            entity_id: job_id.to_string(),
            entity_type: "clip_job".to_string(),
            read: false,
            created_at: Utc::now(),
        }
    }
}
