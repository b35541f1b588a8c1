//! HTTP request handlers for the relay.
//!
//! Handlers are grouped by functionality:
//! - `webhook` - device event ingestion and outcome mapping
//! - `health` - liveness text, health report and device heartbeat
//!
//! Everything a device can trip over answers with a body it can log: JSON
//! for event outcomes, plain text for routing errors.

pub mod health;
pub mod webhook;

use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::debug;

pub use health::{health_check, heartbeat, liveness};
pub use webhook::{
    device_webhook_hint, receive_device_event, receive_device_webhook_event, receive_event,
};

use crate::AppState;

/// Answers a known path called with the wrong method.
pub async fn method_not_allowed(method: Method) -> Response {
    debug!(%method, "Method not allowed");
    (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response()
}

/// Catch-all for unknown paths.
///
/// Some terminals probe arbitrary paths with `GET` to check the server is up,
/// so those get the liveness text. Terminals provisioned with a
/// `/<device>-webhook` URL post events here too. Anything else is a 404.
pub async fn fallback(State(app_state): State<AppState>, request: Request) -> Response {
    let method = request.method().clone();
    if method == Method::GET || method == Method::HEAD {
        return liveness(State(app_state)).await;
    }

    if method == Method::POST {
        let (parts, body) = request.into_parts();
        if let Some(device_hint) = device_webhook_hint(parts.uri.path()) {
            return receive_device_webhook_event(&app_state, device_hint, &parts.headers, body)
                .await;
        }
    }

    (StatusCode::NOT_FOUND, "Not Found").into_response()
}
