//! Integration tests for device payload normalization.
//!
//! Drives [`Normalizer`] with payloads shaped like real terminal pushes and
//! checks the resulting canonical events.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use clockrelay_core::{
    Direction, EventSource, NormalizationError, Normalizer, NormalizerConfig, TestClock,
};

fn normalizer() -> Normalizer {
    let clock = TestClock::with_start_time(Utc.with_ymd_and_hms(2026, 2, 26, 10, 0, 0).unwrap());
    Normalizer::new(NormalizerConfig::default(), Arc::new(clock))
}

const CHECKOUT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<EventNotificationAlert version="2.0">
    <dateTime>2026-02-26T15:30:00+02:00</dateTime>
    <eventType>AccessControllerEvent</eventType>
    <AccessControllerEvent>
        <employeeNoString>1</employeeNoString>
        <name>azam</name>
        <attendanceStatus>checkOut</attendanceStatus>
    </AccessControllerEvent>
</EventNotificationAlert>"#;

#[test]
fn xml_checkout_alert_becomes_out_event() {
    let event = normalizer().normalize(CHECKOUT_XML.as_bytes(), Some("application/xml")).unwrap();

    assert_eq!(event.employee_id(), "1");
    assert_eq!(event.employee_name(), Some("azam"));
    assert_eq!(event.direction(), Direction::Out);
    assert_eq!(event.raw_status(), "checkOut");
    assert_eq!(event.timestamp_rfc3339(), "2026-02-26T15:30:00+02:00");
    assert_eq!(event.device_id(), "admin");
    assert_eq!(event.source(), EventSource::Webhook);
}

#[test]
fn json_clock_in_becomes_in_event() {
    let body = br#"{"deviceId":"admin","employeeId":"1","eventType":"clock-in","timestamp":"2026-02-26T08:00:00Z"}"#;

    let event = normalizer().normalize(body, Some("application/json")).unwrap();

    assert_eq!(event.direction(), Direction::In);
    assert_eq!(event.raw_status(), "clock-in");
    assert_eq!(event.timestamp_rfc3339(), "2026-02-26T08:00:00Z");
}

#[test]
fn multipart_event_log_is_normalized() {
    let body = concat!(
        "--MIME_boundary\r\n",
        "Content-Disposition: form-data; name=\"event_log\"\r\n",
        "Content-Type: application/json\r\n",
        "\r\n",
        "{\"deviceID\":\"fc4349999\",\"dateTime\":\"2026-02-26T07:58:12+03:00\",",
        "\"eventType\":\"AccessControllerEvent\",",
        "\"AccessControllerEvent\":{\"employeeNoString\":\"17\",\"name\":\"Sara\",",
        "\"attendanceStatus\":\"checkIn\",\"subEventType\":75}}\r\n",
        "--MIME_boundary\r\n",
        "Content-Disposition: form-data; name=\"Picture\"; filename=\"face.jpg\"\r\n",
        "Content-Type: image/jpeg\r\n",
        "\r\n",
        "\u{FF}\u{D8}\u{FF}\r\n",
        "--MIME_boundary--\r\n",
    );

    let event = normalizer()
        .normalize(body.as_bytes(), Some("multipart/form-data; boundary=MIME_boundary"))
        .unwrap();

    assert_eq!(event.device_id(), "fc4349999");
    assert_eq!(event.employee_id(), "17");
    assert_eq!(event.employee_name(), Some("Sara"));
    assert_eq!(event.direction(), Direction::In);
    assert_eq!(event.timestamp_rfc3339(), "2026-02-26T07:58:12+03:00");
}

#[test]
fn missing_employee_is_rejected() {
    let body = br#"<EventNotificationAlert><attendanceStatus>checkIn</attendanceStatus></EventNotificationAlert>"#;

    let error = normalizer().normalize(body, None).unwrap_err();

    assert_eq!(error, NormalizationError::MissingEmployee);
}

#[test]
fn unknown_status_is_rejected() {
    let body = br#"{"employeeId":"1","eventType":"maybe"}"#;

    let error = normalizer().normalize(body, None).unwrap_err();

    assert_eq!(error.reason(), "unknown_status");
    assert_eq!(error, NormalizationError::unknown_status("maybe"));
}

#[test]
fn unparsable_timestamp_is_rejected() {
    let body = br#"{"employeeId":"1","eventType":"1","timestamp":"26/02/2026"}"#;

    let error = normalizer().normalize(body, None).unwrap_err();

    assert_eq!(error.reason(), "invalid_timestamp");
}

#[test]
fn replay_source_default_is_configurable() {
    let clock = TestClock::new();
    let config =
        NormalizerConfig { default_source: EventSource::Relay, ..NormalizerConfig::default() };
    let normalizer = Normalizer::new(config, Arc::new(clock));

    let untagged = normalizer.normalize(br#"{"employeeId":"1","eventType":"2"}"#, None).unwrap();
    let tagged = normalizer
        .normalize(br#"{"employeeId":"1","eventType":"2","source":"test"}"#, None)
        .unwrap();

    assert_eq!(untagged.source(), EventSource::Relay);
    assert_eq!(tagged.source(), EventSource::Test);
}

#[test]
fn receipt_time_follows_clock() {
    let clock = TestClock::with_start_time(Utc.with_ymd_and_hms(2026, 2, 26, 10, 0, 0).unwrap());
    let normalizer = Normalizer::new(NormalizerConfig::default(), Arc::new(clock.clone()));
    let body = br#"{"employeeId":"1","eventType":"checkin"}"#;

    let first = normalizer.normalize(body, None).unwrap();
    clock.advance(std::time::Duration::from_secs(5));
    let second = normalizer.normalize(body, None).unwrap();

    assert_eq!(first.timestamp_rfc3339(), "2026-02-26T10:00:00Z");
    assert_eq!(second.timestamp_rfc3339(), "2026-02-26T10:00:05Z");
    assert_eq!(first.employee_id(), second.employee_id());
    assert_eq!(first.direction(), second.direction());
}
