//! Health check handlers.

use std::future::Future;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

/// Liveness check.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub checks: ReadinessChecks,
}

/// Per-backend results; absent backends are omitted.
#[derive(Default, Serialize)]
pub struct ReadinessChecks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firestore: Option<CheckStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<CheckStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<CheckStatus>,
    pub media_service: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl Default for CheckStatus {
    fn default() -> Self {
        Self::error("not checked")
    }
}

impl CheckStatus {
    fn ok(latency_ms: Option<u64>) -> Self {
        Self {
            status: "ok",
            error: None,
            latency_ms,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error",
            error: Some(msg.into()),
            latency_ms: None,
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

async fn timed<T, E, F>(check: F) -> CheckStatus
where
    E: std::fmt::Display,
    F: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    match check.await {
        Ok(_) => CheckStatus::ok(Some(start.elapsed().as_millis() as u64)),
        Err(e) => CheckStatus::error(e.to_string()),
    }
}

/// Readiness check: backing services reachable and media credentials present.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let mut checks = ReadinessChecks {
        media_service: if state.pipeline.media_configured() {
            CheckStatus::ok(None)
        } else {
            CheckStatus::error("media service credentials not configured")
        },
        ..Default::default()
    };

    if let Some(backends) = &state.backends {
        checks.firestore = Some(timed(backends.firestore.get_document("_health", "_check")).await);
        checks.storage = Some(timed(backends.storage.check_connectivity()).await);
        if let Some(events) = &backends.events {
            checks.redis = Some(timed(events.ping()).await);
        }
    }

    let all_ok = checks.media_service.is_ok()
        && [&checks.firestore, &checks.storage, &checks.redis]
            .into_iter()
            .flatten()
            .all(CheckStatus::is_ok);

    let (status, label) = if all_ok {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    (status, Json(ReadinessResponse { status: label, checks }))
}
