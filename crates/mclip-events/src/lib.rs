//! Per-user real-time events via Redis Pub/Sub.
//!
//! Only the publish side lives here; delivery to browsers is handled by
//! whatever subscribes to `user:{userId}:events`.

pub mod error;
pub mod publisher;

pub use error::{EventError, EventResult};
pub use publisher::{EventPublisher, EventsConfig, UserEvent};
