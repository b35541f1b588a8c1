//! Outbound JSON contract of the downstream webhook.
//!
//! Field names are fixed by the consumer. `attendanceStatus` and `eventType`
//! carry the same direction in two vocabularies because the consumer reads
//! both.

use clockrelay_core::{AttendanceEvent, Direction, EventSource};
use serde::{Deserialize, Serialize};

/// Body posted to the downstream webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    /// Originating terminal.
    pub device_id: String,
    /// Badge identifier.
    pub employee_id: String,
    /// Display name; serialized as `null` when unknown.
    pub employee_name: Option<String>,
    /// `in` or `out`.
    pub attendance_status: Direction,
    /// `checkin` or `checkout`.
    pub event_type: String,
    /// RFC 3339 device time.
    pub timestamp: String,
    /// Original device body, only when raw forwarding is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<String>,
    /// Provenance tag.
    pub source: EventSource,
}

impl WebhookPayload {
    /// Attaches the original device body.
    #[must_use]
    pub fn with_raw_data(mut self, raw: &[u8]) -> Self {
        self.raw_data = Some(String::from_utf8_lossy(raw).into_owned());
        self
    }
}

impl From<&AttendanceEvent> for WebhookPayload {
    fn from(event: &AttendanceEvent) -> Self {
        Self {
            device_id: event.device_id().to_string(),
            employee_id: event.employee_id().to_string(),
            employee_name: event.employee_name().map(str::to_string),
            attendance_status: event.direction(),
            event_type: event.direction().as_event_type().to_string(),
            timestamp: event.timestamp_rfc3339(),
            raw_data: None,
            source: event.source(),
        }
    }
}
