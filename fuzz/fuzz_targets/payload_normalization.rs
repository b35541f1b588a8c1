#![no_main]

//! Fuzz target for device payload normalization.
//!
//! Devices are untrusted: whatever bytes arrive, normalization must return
//! an event or a typed error, never panic. Accepted events must be complete.

use chrono::{TimeZone, Utc};
use clockrelay_core::{normalize_at, EventSource, ReceiptContext};
use libfuzzer_sys::fuzz_target;

const CONTENT_TYPES: &[Option<&str>] = &[
    None,
    Some("application/xml"),
    Some("application/json"),
    Some("multipart/form-data; boundary=MIME_boundary"),
    Some("multipart/form-data"),
    Some("text/plain"),
    Some("\x00\x01\x02"),
];

fuzz_target!(|data: &[u8]| {
    let context = ReceiptContext {
        fallback_device_id: "admin",
        default_source: EventSource::Webhook,
        received_at: Utc.timestamp_opt(1_772_100_000, 0).single().unwrap_or_default(),
    };

    for content_type in CONTENT_TYPES {
        if let Ok(event) = normalize_at(data, *content_type, &context) {
            assert!(!event.employee_id().trim().is_empty());
            assert!(!event.device_id().trim().is_empty());
            let status = event.direction().as_attendance_status();
            assert!(status == "in" || status == "out");
        }
    }
});
