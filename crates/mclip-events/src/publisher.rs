//! Publisher for `user:{userId}:events` channels.

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::debug;

use mclip_models::Notification;

use crate::error::{EventError, EventResult};

/// Redis connection settings.
#[derive(Debug, Clone)]
pub struct EventsConfig {
    pub redis_url: String,
}

impl EventsConfig {
    pub fn from_env() -> EventResult<Self> {
        let redis_url = std::env::var("REDIS_URL")
            .ok()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| EventError::config_error("REDIS_URL not set"))?;
        Ok(Self { redis_url })
    }
}

/// Event delivered to a single user's channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum UserEvent {
    Notification(Notification),
}

impl UserEvent {
    pub fn user_id(&self) -> &str {
        match self {
            UserEvent::Notification(n) => &n.user_id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            UserEvent::Notification(_) => "notification",
        }
    }
}

/// Publishes user events over Redis Pub/Sub.
#[derive(Clone)]
pub struct EventPublisher {
    client: redis::Client,
}

impl EventPublisher {
    pub fn new(redis_url: &str) -> EventResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub fn from_config(config: &EventsConfig) -> EventResult<Self> {
        Self::new(&config.redis_url)
    }

    /// Channel name for a user.
    pub fn channel_name(user_id: &str) -> String {
        format!("user:{}:events", user_id)
    }

    /// Publish an event; returns the number of subscribers that received it.
    pub async fn publish(&self, event: &UserEvent) -> EventResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = Self::channel_name(event.user_id());
        let payload = serde_json::to_string(event)?;

        debug!(channel = %channel, kind = event.kind(), "Publishing user event");
        let receivers: u64 = conn.publish(&channel, payload).await?;
        metrics::counter!("mclip_events_published_total", "kind" => event.kind()).increment(1);

        Ok(receivers)
    }

    pub async fn publish_notification(&self, notification: &Notification) -> EventResult<u64> {
        self.publish(&UserEvent::Notification(notification.clone())).await
    }

    /// Round-trip a PING, used by readiness checks.
    pub async fn ping(&self) -> EventResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}
