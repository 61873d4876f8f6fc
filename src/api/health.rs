//! Health check endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use super::ApiState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Detailed readiness response
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub checks: ReadinessChecks,
}

/// Credential checks per provider
#[derive(Serialize)]
pub struct ReadinessChecks {
    pub transcription: CheckResult,
    pub coaching: CheckResult,
    pub synthesis: CheckResult,
    pub identity: CheckResult,
}

/// Result of a single check
#[derive(Serialize)]
pub struct CheckResult {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckResult {
    const fn ok() -> Self {
        Self {
            status: "ok",
            message: None,
        }
    }

    fn unavailable() -> Self {
        Self {
            status: "unavailable",
            message: Some("not configured".to_string()),
        }
    }

    fn from_configured(configured: bool) -> Self {
        if configured { Self::ok() } else { Self::unavailable() }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Liveness probe
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness probe
///
/// Missing speech or coaching keys degrade the service; missing identity
/// makes every protected endpoint refuse, so that alone is not ready.
async fn ready(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<ReadinessResponse>) {
    let checks = ReadinessChecks {
        transcription: CheckResult::from_configured(state.stt.is_configured()),
        coaching: CheckResult::from_configured(state.coaching.is_configured()),
        synthesis: CheckResult::from_configured(state.tts.is_configured()),
        identity: state
            .identity
            .as_ref()
            .map_or_else(CheckResult::unavailable, |_| CheckResult::ok()),
    };

    let providers_ok =
        checks.transcription.is_ok() && checks.coaching.is_ok() && checks.synthesis.is_ok();

    let (http_status, status) = if !checks.identity.is_ok() {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    } else if providers_ok {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::OK, "degraded")
    };

    (http_status, Json(ReadinessResponse { status, checks }))
}

/// Unauthenticated liveness route
pub fn router() -> Router {
    Router::new().route("/health", get(health))
}

/// Unauthenticated readiness route
pub fn ready_router(state: Arc<ApiState>) -> Router {
    Router::new().route("/ready", get(ready)).with_state(state)
}
