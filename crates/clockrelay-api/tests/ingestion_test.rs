//! Device webhook ingestion tests.
//!
//! Drives the full router in-process against a wiremock downstream and checks
//! both what the downstream receives and what the device is told.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::{sync::Arc, time::Duration};

use axum::http::{Method, StatusCode};
use bytes::Bytes;
use clockrelay_api::Config;
use clockrelay_core::{Direction, EventSource};
use clockrelay_delivery::{Deliver, DeliveryOutcome, WebhookPayload};
use clockrelay_testing::{
    refused_url, AlertBuilder, MockDownstream, MockResponse, TestRelay, SAMPLE_CHECKOUT_XML,
};
use serde_json::json;

const XML: &str = "application/xml";
const JSON: &str = "application/json";

#[tokio::test]
async fn xml_checkout_alert_is_forwarded() {
    let relay = TestRelay::start().await;
    relay
        .downstream
        .respond_with(MockResponse::Json {
            status: 200,
            body: json!({ "success": true, "recordId": "att_1" }),
        })
        .await;

    let response = relay.post_event(XML, SAMPLE_CHECKOUT_XML).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!({ "success": true, "recordId": "att_1" }));

    let payloads = relay.downstream.received_payloads().await;
    assert_eq!(payloads.len(), 1);
    let payload = &payloads[0];
    assert_eq!(payload.device_id, "admin");
    assert_eq!(payload.employee_id, "1");
    assert_eq!(payload.employee_name.as_deref(), Some("azam"));
    assert_eq!(payload.attendance_status, Direction::Out);
    assert_eq!(payload.event_type, "checkout");
    assert_eq!(payload.timestamp, "2026-02-26T15:30:00+02:00");
    assert_eq!(payload.source, EventSource::Webhook);
    assert_eq!(payload.raw_data, None);
}

#[tokio::test]
async fn json_clock_in_is_forwarded_as_in() {
    let relay = TestRelay::start().await;
    relay.downstream.respond_with(MockResponse::success()).await;

    let body = json!({
        "deviceId": "admin",
        "employeeId": "1",
        "eventType": "clock-in",
        "timestamp": "2026-02-26T08:00:00Z"
    });
    let response = relay.post_event(JSON, body.to_string()).await;

    assert_eq!(response.status, StatusCode::OK);
    let payloads = relay.downstream.received_payloads().await;
    assert_eq!(payloads[0].attendance_status, Direction::In);
    assert_eq!(payloads[0].event_type, "checkin");
    assert_eq!(payloads[0].timestamp, "2026-02-26T08:00:00Z");
    assert_eq!(payloads[0].employee_name, None);
}

#[tokio::test]
async fn multipart_push_uses_event_log_part() {
    let relay = TestRelay::start().await;
    relay.downstream.respond_with(MockResponse::success()).await;

    let (body, content_type) =
        AlertBuilder::check_in().device_id("fc4349999").employee_id("17").to_multipart();
    let response = relay.post_event(&content_type, body).await;

    assert_eq!(response.status, StatusCode::OK);
    let payloads = relay.downstream.received_payloads().await;
    assert_eq!(payloads[0].device_id, "fc4349999");
    assert_eq!(payloads[0].employee_id, "17");
    assert_eq!(payloads[0].attendance_status, Direction::In);
}

#[tokio::test]
async fn device_path_fills_in_missing_device_id() {
    let relay = TestRelay::start().await;
    relay.downstream.respond_with(MockResponse::success()).await;

    let response =
        relay.post("/webhook/gate-7", Some(XML), AlertBuilder::check_out().to_xml()).await;
    assert_eq!(response.status, StatusCode::OK);

    let xml = AlertBuilder::check_out().device_id("lobby-2").to_xml();
    let response = relay.post("/webhook/gate-7", Some(XML), xml).await;
    assert_eq!(response.status, StatusCode::OK);

    let payloads = relay.downstream.received_payloads().await;
    assert_eq!(payloads[0].device_id, "gate-7");
    assert_eq!(payloads[1].device_id, "lobby-2");
}

#[tokio::test]
async fn missing_employee_is_rejected_without_forwarding() {
    let relay = TestRelay::start().await;
    relay.downstream.respond_with(MockResponse::success()).await;

    let xml = AlertBuilder::check_in().without_employee().to_xml();
    let response = relay.post_event(XML, xml).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "missing_employee");
    relay.downstream.assert_request_count(0).await;
}

#[tokio::test]
async fn unknown_status_is_rejected_without_forwarding() {
    let relay = TestRelay::start().await;

    let response = relay.post_event(XML, AlertBuilder::check_in().status("maybe").to_xml()).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let json = response.json();
    assert_eq!(json["error"], "unknown_status");
    assert!(json["message"].as_str().unwrap().contains("maybe"));
    relay.downstream.assert_request_count(0).await;
}

#[tokio::test]
async fn garbage_body_is_malformed() {
    let relay = TestRelay::start().await;

    let response = relay.post("/webhook", None, Bytes::from_static(b"\x00\x01binary")).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "malformed_payload");

    let response = relay.post("/webhook", Some(JSON), "").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    relay.downstream.assert_request_count(0).await;
}

#[tokio::test]
async fn missing_timestamp_uses_receipt_time() {
    let relay = TestRelay::start().await;
    relay.downstream.respond_with(MockResponse::success()).await;
    relay.clock.advance(Duration::from_secs(30));

    let xml = AlertBuilder::check_in().without_date_time().to_xml();
    relay.post_event(XML, xml).await;

    let payloads = relay.downstream.received_payloads().await;
    assert_eq!(payloads[0].timestamp, "2026-02-26T10:00:30Z");
}

#[tokio::test]
async fn downstream_unavailable_is_mirrored() {
    let relay = TestRelay::start().await;
    relay
        .downstream
        .respond_with(MockResponse::Raw {
            status: 503,
            body: Bytes::from_static(br#"{"error":"maintenance window"}"#),
            content_type: Some(JSON.to_string()),
        })
        .await;

    let response = relay.post_event(XML, SAMPLE_CHECKOUT_XML).await;

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(&response.body[..], br#"{"error":"maintenance window"}"#);
    assert_eq!(response.header("content-type"), Some(JSON));
}

#[tokio::test]
async fn downstream_rejection_keeps_its_content_type() {
    let relay = TestRelay::start().await;
    relay
        .downstream
        .respond_with(MockResponse::Raw {
            status: 404,
            body: Bytes::from_static(b"employee 1 not enrolled"),
            content_type: Some("text/plain".to_string()),
        })
        .await;

    let response = relay.post_event(XML, SAMPLE_CHECKOUT_XML).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.text(), "employee 1 not enrolled");
    assert_eq!(response.header("content-type"), Some("text/plain"));
    relay.downstream.assert_request_count(1).await;
}

#[tokio::test]
async fn unreachable_downstream_returns_bad_gateway_promptly() {
    let relay = TestRelay::start_with(|config| {
        config.downstream_url = refused_url();
        config.delivery_timeout_seconds = 2;
    })
    .await;

    let response = tokio::time::timeout(
        Duration::from_secs(5),
        relay.post_event(XML, SAMPLE_CHECKOUT_XML),
    )
    .await
    .expect("relay must answer within the delivery timeout");

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert!(response.json()["error"].as_str().unwrap().contains("connection"));
}

#[tokio::test]
async fn slow_downstream_times_out_as_bad_gateway() {
    let relay = TestRelay::start_with(|config| config.delivery_timeout_seconds = 1).await;
    relay.downstream.respond_with(MockResponse::Delayed { delay: Duration::from_secs(3) }).await;

    let response = relay.post_event(XML, SAMPLE_CHECKOUT_XML).await;

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(response.json()["error"], "request timeout after 1000ms");
}

#[tokio::test]
async fn empty_downstream_body_reports_success() {
    let relay = TestRelay::start().await;
    relay.downstream.respond_with(MockResponse::status(204)).await;

    let response = relay.post_event(XML, SAMPLE_CHECKOUT_XML).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!({ "success": true }));
}

#[tokio::test]
async fn raw_payload_is_forwarded_when_enabled() {
    let relay = TestRelay::start_with(|config| config.forward_raw_payload = true).await;
    relay.downstream.respond_with(MockResponse::success()).await;

    relay.post_event(XML, SAMPLE_CHECKOUT_XML).await;

    let payloads = relay.downstream.received_payloads().await;
    assert_eq!(payloads[0].raw_data.as_deref(), Some(SAMPLE_CHECKOUT_XML));
}

#[tokio::test]
async fn oversized_body_is_refused() {
    let relay = TestRelay::start_with(|config| config.max_body_bytes = 256).await;
    relay.downstream.respond_with(MockResponse::success()).await;

    let response = relay.post_event(XML, SAMPLE_CHECKOUT_XML).await;

    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    relay.downstream.assert_request_count(0).await;
}

#[tokio::test]
async fn custom_webhook_path_is_served() {
    let relay = TestRelay::start_with(|config| config.webhook_path = "/hik/events".into()).await;
    relay.downstream.respond_with(MockResponse::success()).await;

    let response = relay.post("/hik/events", Some(XML), SAMPLE_CHECKOUT_XML).await;
    assert_eq!(response.status, StatusCode::OK);

    let response = relay.post("/webhook", Some(XML), SAMPLE_CHECKOUT_XML).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    relay.downstream.assert_request_count(1).await;
}

#[tokio::test]
async fn device_webhook_path_names_the_device() {
    let relay = TestRelay::start().await;
    relay.downstream.respond_with(MockResponse::success()).await;

    let xml = AlertBuilder::check_in().to_xml();
    let response = relay.post("/fc4349999-webhook", Some(XML), xml).await;
    assert_eq!(response.status, StatusCode::OK);

    let xml = AlertBuilder::check_in().device_id("lobby-2").to_xml();
    let response = relay.post("/fc4349999-webhook", Some(XML), xml).await;
    assert_eq!(response.status, StatusCode::OK);

    let payloads = relay.downstream.received_payloads().await;
    assert_eq!(payloads[0].device_id, "fc4349999");
    assert_eq!(payloads[1].device_id, "lobby-2");
}

#[tokio::test]
async fn admin_webhook_path_uses_default_device() {
    let relay =
        TestRelay::start_with(|config| config.default_device_id = "front-desk".into()).await;
    relay.downstream.respond_with(MockResponse::success()).await;

    let xml = AlertBuilder::check_out().to_xml();
    let response = relay.post("/admin-webhook", Some(XML), xml).await;

    assert_eq!(response.status, StatusCode::OK);
    let payloads = relay.downstream.received_payloads().await;
    assert_eq!(payloads[0].device_id, "front-desk");
    assert_eq!(payloads[0].attendance_status, Direction::Out);
}

#[tokio::test]
async fn device_webhook_path_rejects_bad_payloads_and_large_bodies() {
    let relay = TestRelay::start_with(|config| config.max_body_bytes = 256).await;
    relay.downstream.respond_with(MockResponse::success()).await;

    let response = relay.post("/fc4349999-webhook", Some(JSON), "{}").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "missing_employee");

    let response = relay.post("/fc4349999-webhook", Some(XML), SAMPLE_CHECKOUT_XML).await;
    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);

    let response = relay.request(Method::PUT, "/fc4349999-webhook").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    relay.downstream.assert_request_count(0).await;
}

#[tokio::test]
async fn large_downstream_body_is_mirrored_whole() {
    let relay = TestRelay::start().await;
    let large = format!(r#"{{"error":"{}"}}"#, "x".repeat(100_000));
    relay
        .downstream
        .respond_with(MockResponse::Raw {
            status: 503,
            body: Bytes::from(large.clone()),
            content_type: Some(JSON.to_string()),
        })
        .await;

    let response = relay.post_event(XML, SAMPLE_CHECKOUT_XML).await;

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.body.len(), large.len());
    assert_eq!(response.text(), large);
}

#[tokio::test]
async fn large_delivered_body_is_passed_through() {
    let relay = TestRelay::start().await;
    let large = serde_json::json!({ "success": true, "note": "y".repeat(100_000) });
    relay.downstream.respond_with(MockResponse::Json { status: 200, body: large.clone() }).await;

    let response = relay.post_event(XML, SAMPLE_CHECKOUT_XML).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), large);
}

#[derive(Debug)]
struct PanickingSink;

#[async_trait::async_trait]
impl Deliver for PanickingSink {
    async fn deliver_payload(&self, _payload: &WebhookPayload) -> DeliveryOutcome {
        panic!("sink failure");
    }
}

#[tokio::test]
async fn delivery_fault_is_internal_error_and_relay_keeps_serving() {
    let downstream = MockDownstream::start().await;
    let config = Config { downstream_url: downstream.url(), ..Config::default() };
    let relay = TestRelay::with_sink(downstream, config, Arc::new(PanickingSink));

    let response = relay.post_event(XML, SAMPLE_CHECKOUT_XML).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json(), json!({ "error": "internal_error" }));

    let response = relay.get("/").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.text().contains("Status: Ready"));

    let response = relay.post_event(XML, SAMPLE_CHECKOUT_XML).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
}
