//! Device event ingestion.
//!
//! One request carries one event. The relay normalizes it, posts it
//! downstream exactly once and answers the device with the downstream's
//! verdict. Terminals resend on any non-2xx, so nothing here retries and
//! nothing is buffered.
//!
//! Response mapping:
//!
//! | Outcome                   | Device sees                               |
//! |---------------------------|-------------------------------------------|
//! | payload not normalizable  | 400 `{"error": reason, "message": ..}`    |
//! | downstream 2xx            | 200 with the downstream JSON body         |
//! | downstream non-2xx        | same status, same body and content type   |
//! | downstream unreachable    | 502 `{"error": ..}`                       |

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header::CONTENT_TYPE, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use clockrelay_core::NormalizationError;
use clockrelay_delivery::{DeliveryOutcome, WebhookPayload};
use serde_json::json;
use tracing::{error, info, instrument, warn, Instrument, Span};

use crate::AppState;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Longest slice of a downstream body written to a log line.
const MAX_LOGGED_BODY: usize = 1024;

/// Receives an event on the shared webhook path.
#[instrument(
    name = "receive_event",
    skip(app_state, headers, body),
    fields(body_size = body.len(), device_id = tracing::field::Empty)
)]
pub async fn receive_event(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    relay_event(&app_state, &headers, body, None).await
}

/// Receives an event on a device-scoped path.
///
/// The path segment stands in for the device id when the payload has none.
#[instrument(
    name = "receive_event",
    skip(app_state, headers, body),
    fields(body_size = body.len(), device_id = tracing::field::Empty)
)]
pub async fn receive_device_event(
    State(app_state): State<AppState>,
    Path(device_hint): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    relay_event(&app_state, &headers, body, Some(device_hint.as_str())).await
}

/// Suffix of the per-device path segment older deployments provision,
/// e.g. `/fc4349999-webhook`.
const DEVICE_WEBHOOK_SUFFIX: &str = "-webhook";

/// Segment id meaning "no particular device" (`/admin-webhook`).
const ADMIN_DEVICE_SEGMENT: &str = "admin";

/// Extracts the device id from a `/<device>-webhook` path.
///
/// Only the first segment is inspected. The id is non-empty and holds no
/// `-`. `/admin-webhook` matches but carries no id, leaving the configured
/// fallback device in place.
pub fn device_webhook_hint(path: &str) -> Option<Option<&str>> {
    let segment = path.strip_prefix('/')?.split('/').next()?;
    let device_id = segment.strip_suffix(DEVICE_WEBHOOK_SUFFIX)?;

    if device_id.is_empty() || device_id.contains('-') {
        return None;
    }
    if device_id == ADMIN_DEVICE_SEGMENT {
        return Some(None);
    }
    Some(Some(device_id))
}

/// Receives an event on a `/<device>-webhook` path.
///
/// Reached through the router fallback, so the body limit is enforced here.
#[instrument(
    name = "receive_event",
    skip(app_state, headers, body),
    fields(device_id = tracing::field::Empty)
)]
pub async fn receive_device_webhook_event(
    app_state: &AppState,
    device_hint: Option<&str>,
    headers: &HeaderMap,
    body: Body,
) -> Response {
    let body = match axum::body::to_bytes(body, app_state.settings.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "Rejected device body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large").into_response();
        },
    };

    relay_event(app_state, headers, body, device_hint).await
}

async fn relay_event(
    app_state: &AppState,
    headers: &HeaderMap,
    body: Bytes,
    device_hint: Option<&str>,
) -> Response {
    let content_type = headers.get(CONTENT_TYPE).and_then(|value| value.to_str().ok());

    let event = match app_state.normalizer.normalize_from_device(&body, content_type, device_hint)
    {
        Ok(event) => event,
        Err(e) => {
            warn!(reason = e.reason(), error = %e, "Rejected device payload");
            return normalization_error_response(&e);
        },
    };

    Span::current().record("device_id", event.device_id());
    info!(
        employee_id = %event.employee_id(),
        direction = %event.direction(),
        timestamp = %event.timestamp_rfc3339(),
        "Forwarding attendance event"
    );

    let mut payload = WebhookPayload::from(&event);
    if app_state.settings.forward_raw_payload {
        payload = payload.with_raw_data(&body);
    }

    // Detached so a device hanging up mid-request does not abort the
    // downstream call and lose the event.
    let delivery = Arc::clone(&app_state.delivery);
    let task = tokio::spawn(
        async move {
            let outcome = delivery.deliver_payload(&payload).await;
            log_outcome(&payload, &outcome);
            outcome
        }
        .in_current_span(),
    );

    match task.await {
        Ok(outcome) => outcome_response(outcome),
        Err(e) => {
            error!(error = %e, "Delivery task failed");
            internal_error_response()
        },
    }
}

fn log_outcome(payload: &WebhookPayload, outcome: &DeliveryOutcome) {
    match outcome {
        DeliveryOutcome::Delivered { status_code, .. } => {
            info!(status_code, "Event delivered downstream");
        },
        DeliveryOutcome::Rejected { status_code, body, .. } => {
            warn!(
                status_code,
                body_size = body.len(),
                response = %log_excerpt(body),
                "Downstream rejected event"
            );
        },
        DeliveryOutcome::Unreachable { error } => {
            // Nothing is stored; this line is the only trace of the event.
            error!(
                error = %error,
                payload = %serde_json::to_string(payload).unwrap_or_default(),
                "Downstream unreachable, event not delivered"
            );
        },
    }
}

fn log_excerpt(body: &[u8]) -> String {
    let excerpt = String::from_utf8_lossy(&body[..body.len().min(MAX_LOGGED_BODY)]);
    if body.len() > MAX_LOGGED_BODY {
        format!("{excerpt}...")
    } else {
        excerpt.into_owned()
    }
}

/// Maps a delivery outcome to the response returned to the device.
pub fn outcome_response(outcome: DeliveryOutcome) -> Response {
    match outcome {
        DeliveryOutcome::Delivered { body, .. } => {
            if serde_json::from_slice::<serde_json::Value>(&body).is_ok() {
                json_bytes_response(StatusCode::OK, body, None)
            } else {
                (StatusCode::OK, Json(json!({ "success": true }))).into_response()
            }
        },
        DeliveryOutcome::Rejected { status_code, body, content_type, .. } => {
            let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::BAD_GATEWAY);
            json_bytes_response(status, body, content_type.as_deref())
        },
        DeliveryOutcome::Unreachable { error } => {
            (StatusCode::BAD_GATEWAY, Json(json!({ "error": error.to_string() }))).into_response()
        },
    }
}

/// Body passed through verbatim under the downstream's content type.
fn json_bytes_response(status: StatusCode, body: Bytes, content_type: Option<&str>) -> Response {
    let content_type = content_type
        .and_then(|value| HeaderValue::from_str(value).ok())
        .unwrap_or_else(|| HeaderValue::from_static(JSON_CONTENT_TYPE));

    (status, [(CONTENT_TYPE, content_type)], body).into_response()
}

fn normalization_error_response(error: &NormalizationError) -> Response {
    let body = json!({
        "error": error.reason(),
        "message": error.to_string(),
    });

    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

fn internal_error_response() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "internal_error" }))).into_response()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clockrelay_delivery::DeliveryError;

    use super::*;

    async fn body_of(response: Response) -> (StatusCode, Option<String>, Bytes) {
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, body)
    }

    #[test]
    fn device_webhook_paths() {
        assert_eq!(device_webhook_hint("/fc4349999-webhook"), Some(Some("fc4349999")));
        assert_eq!(device_webhook_hint("/fc4349999-webhook/"), Some(Some("fc4349999")));
        assert_eq!(device_webhook_hint("/admin-webhook"), Some(None));

        assert_eq!(device_webhook_hint("/-webhook"), None);
        assert_eq!(device_webhook_hint("/gate-7-webhook"), None);
        assert_eq!(device_webhook_hint("/fc4349999-webhooks"), None);
        assert_eq!(device_webhook_hint("/webhook"), None);
        assert_eq!(device_webhook_hint("/api/fc4349999-webhook"), None);
    }

    #[tokio::test]
    async fn delivered_json_passes_through() {
        let outcome = DeliveryOutcome::Delivered {
            status_code: 201,
            body: Bytes::from_static(br#"{"success":true,"recordId":42}"#),
        };

        let (status, content_type, body) = body_of(outcome_response(outcome)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/json"));
        assert_eq!(&body[..], br#"{"success":true,"recordId":42}"#);
    }

    #[tokio::test]
    async fn delivered_without_json_body_reports_success() {
        let outcome =
            DeliveryOutcome::Delivered { status_code: 204, body: Bytes::from_static(b"") };

        let (status, _, body) = body_of(outcome_response(outcome)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], br#"{"success":true}"#);
    }

    #[tokio::test]
    async fn rejection_mirrors_status_body_and_type() {
        let outcome = DeliveryOutcome::Rejected {
            status_code: 422,
            body: Bytes::from_static(b"employee unknown"),
            content_type: Some("text/plain".into()),
            retry_after: None,
        };

        let (status, content_type, body) = body_of(outcome_response(outcome)).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(content_type.as_deref(), Some("text/plain"));
        assert_eq!(&body[..], b"employee unknown");
    }

    #[tokio::test]
    async fn rejection_without_content_type_defaults_to_json() {
        let outcome = DeliveryOutcome::Rejected {
            status_code: 503,
            body: Bytes::from_static(br#"{"error":"maintenance"}"#),
            content_type: None,
            retry_after: Some(Duration::from_secs(30)),
        };

        let (status, content_type, _) = body_of(outcome_response(outcome)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(content_type.as_deref(), Some("application/json"));
    }

    #[test]
    fn log_excerpt_is_bounded() {
        assert_eq!(log_excerpt(b"short"), "short");

        let long = vec![b'x'; MAX_LOGGED_BODY * 4];
        let excerpt = log_excerpt(&long);
        assert_eq!(excerpt.len(), MAX_LOGGED_BODY + 3);
        assert!(excerpt.ends_with("..."));
    }

    #[tokio::test]
    async fn unreachable_maps_to_bad_gateway() {
        let outcome = DeliveryOutcome::Unreachable { error: DeliveryError::timeout(10_000) };

        let (status, _, body) = body_of(outcome_response(outcome)).await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["error"], "request timeout after 10000ms");
    }

    #[tokio::test]
    async fn normalization_errors_carry_reason_token() {
        let response = normalization_error_response(&NormalizationError::MissingEmployee);

        let (status, _, body) = body_of(response).await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "missing_employee");
        assert!(json["message"].is_string());
    }
}
