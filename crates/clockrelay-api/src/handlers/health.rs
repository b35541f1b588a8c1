//! Liveness, health and heartbeat handlers.
//!
//! None of these touch the downstream: a relay whose downstream is down is
//! still alive, and devices must keep seeing that.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::AppState;

/// Name reported by the health endpoint.
const SERVICE_NAME: &str = "clockrelay";

/// Health check response structure.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok` while the process serves requests
    pub status: &'static str,
    /// Service name
    pub service: &'static str,
    /// Service version information
    pub version: &'static str,
    /// Timestamp when health check was performed
    pub timestamp: DateTime<Utc>,
    /// Seconds since the relay started
    pub uptime_seconds: u64,
    /// Host the relay forwards to
    pub downstream_host: String,
}

/// Health check endpoint handler.
///
/// Called frequently by orchestration systems, so it only reads state.
#[instrument(name = "health_check", skip(app_state))]
pub async fn health_check(State(app_state): State<AppState>) -> Response {
    let settings = &app_state.settings;
    let uptime = app_state.clock.now().saturating_duration_since(settings.started_at);

    let response = HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        timestamp: app_state.clock.now_utc(),
        uptime_seconds: uptime.as_secs(),
        downstream_host: settings.downstream_host.clone(),
    };

    debug!(uptime_seconds = response.uptime_seconds, "Health check completed");

    (StatusCode::OK, Json(response)).into_response()
}

/// Plain-text liveness answer for `GET /` and stray `GET`s.
#[instrument(name = "liveness_check", skip(app_state))]
pub async fn liveness(State(app_state): State<AppState>) -> Response {
    debug!("Performing liveness check");

    let settings = &app_state.settings;
    let body = format!(
        "Attendance relay is running\nPort: {}\nWebhook: POST {}\nStatus: Ready\n",
        settings.port, settings.webhook_path
    );

    (StatusCode::OK, body).into_response()
}

/// Device keep-alive. Acknowledged without forwarding anything.
#[instrument(name = "heartbeat")]
pub async fn heartbeat() -> Response {
    debug!("Device heartbeat received");
    (StatusCode::OK, "OK").into_response()
}
