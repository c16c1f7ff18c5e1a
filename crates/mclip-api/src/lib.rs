//! Axum HTTP API server.
//!
//! This crate provides:
//! - Job submission and presigned uploads for authenticated users
//! - The media webhook that drives the clip pipeline
//! - Rate limiting, security headers and Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod state;

pub use auth::{AuthUser, TokenVerifier};
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
