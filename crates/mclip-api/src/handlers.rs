//! Request handlers.

pub mod health;
pub mod jobs;
pub mod uploads;
pub mod webhooks;

pub use health::{health, ready};
pub use jobs::create_job;
pub use uploads::create_upload;
pub use webhooks::media_webhook;
