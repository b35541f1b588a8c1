//! Canonical attendance event and its vocabulary.
//!
//! An [`AttendanceEvent`] can only be obtained through
//! [`EventBuilder::build`], which validates every field in one step. A
//! partially populated event is never observable.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{NormalizationError, Result};

/// Canonical clocking direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Employee clocked in.
    In,
    /// Employee clocked out.
    Out,
}

impl Direction {
    /// Resolves a raw device status token, ignoring case and surrounding
    /// whitespace.
    ///
    /// Accepted tokens are `1`, `checkin`, `clock-in` and `in` for
    /// [`Direction::In`], and `2`, `checkout`, `clock-out` and `out` for
    /// [`Direction::Out`]. Anything else resolves to `None`.
    pub fn from_status(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "1" | "checkin" | "clock-in" | "in" => Some(Self::In),
            "2" | "checkout" | "clock-out" | "out" => Some(Self::Out),
            _ => None,
        }
    }

    /// Downstream `attendanceStatus` vocabulary.
    pub const fn as_attendance_status(self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }

    /// Downstream `eventType` vocabulary.
    pub const fn as_event_type(self) -> &'static str {
        match self {
            Self::In => "checkin",
            Self::Out => "checkout",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_attendance_status())
    }
}

/// How an event entered the system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    /// Pushed by a device to the relay's webhook.
    #[default]
    Webhook,
    /// Re-sent by the relay itself, e.g. a batch replay.
    Relay,
    /// Synthetic event from a test harness.
    Test,
}

impl EventSource {
    /// Parses a provenance tag, ignoring case.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "webhook" => Some(Self::Webhook),
            "relay" => Some(Self::Relay),
            "test" => Some(Self::Test),
            _ => None,
        }
    }

    /// Returns the wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::Relay => "relay",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated attendance notification.
///
/// Immutable once built. `employee_id` and `device_id` are never empty and
/// `direction` is always resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEvent {
    device_id: String,
    employee_id: String,
    employee_name: Option<String>,
    #[serde(serialize_with = "serialize_timestamp")]
    timestamp: DateTime<FixedOffset>,
    direction: Direction,
    raw_status: String,
    source: EventSource,
}

impl AttendanceEvent {
    /// Starts an empty builder.
    pub fn builder() -> EventBuilder {
        EventBuilder::default()
    }

    /// Originating terminal.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Badge identifier as reported by the device.
    pub fn employee_id(&self) -> &str {
        &self.employee_id
    }

    /// Display name, when the device sent one.
    pub fn employee_name(&self) -> Option<&str> {
        self.employee_name.as_deref()
    }

    /// When the device recorded the event.
    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    /// The timestamp rendered as RFC 3339, keeping the device's offset.
    pub fn timestamp_rfc3339(&self) -> String {
        format_timestamp(&self.timestamp)
    }

    /// Canonical direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Status token exactly as the device sent it.
    pub fn raw_status(&self) -> &str {
        &self.raw_status
    }

    /// Provenance tag.
    pub fn source(&self) -> EventSource {
        self.source
    }
}

/// Request-scoped defaults applied while building an event.
#[derive(Debug, Clone, Copy)]
pub struct ReceiptContext<'a> {
    /// Device id used when the payload carries none.
    pub fallback_device_id: &'a str,
    /// Source used when the payload carries no recognizable tag.
    pub default_source: EventSource,
    /// Relay receipt time, substituted for a missing timestamp.
    pub received_at: DateTime<Utc>,
}

/// Collects raw payload fields before validation.
///
/// Fields hold the device's text verbatim. Validation and vocabulary
/// mapping happen only in [`EventBuilder::build`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBuilder {
    pub(crate) device_id: Option<String>,
    pub(crate) employee_id: Option<String>,
    pub(crate) employee_name: Option<String>,
    pub(crate) timestamp: Option<String>,
    pub(crate) status: Option<String>,
    pub(crate) source: Option<EventSource>,
}

impl EventBuilder {
    /// Sets the device identifier.
    #[must_use]
    pub fn device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Sets the employee badge identifier.
    #[must_use]
    pub fn employee_id(mut self, employee_id: impl Into<String>) -> Self {
        self.employee_id = Some(employee_id.into());
        self
    }

    /// Sets the employee display name.
    #[must_use]
    pub fn employee_name(mut self, name: impl Into<String>) -> Self {
        self.employee_name = Some(name.into());
        self
    }

    /// Sets the raw device timestamp.
    #[must_use]
    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Sets the raw status token.
    #[must_use]
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Sets the provenance tag.
    #[must_use]
    pub fn source(mut self, source: EventSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Validates the collected fields and produces an event.
    ///
    /// # Errors
    ///
    /// - `MissingEmployee` when no non-blank employee id was collected
    /// - `UnknownStatus` when the status is absent or outside the
    ///   vocabulary
    /// - `InvalidTimestamp` when a timestamp is present but unparsable
    pub fn build(self, context: &ReceiptContext<'_>) -> Result<AttendanceEvent> {
        let employee_id = non_blank(self.employee_id).ok_or(NormalizationError::MissingEmployee)?;

        let raw_status = self.status.map(|s| s.trim().to_string()).unwrap_or_default();
        let direction = Direction::from_status(&raw_status)
            .ok_or_else(|| NormalizationError::unknown_status(raw_status.clone()))?;

        let timestamp = match non_blank(self.timestamp) {
            Some(value) => parse_device_timestamp(&value)
                .ok_or(NormalizationError::InvalidTimestamp { value })?,
            None => context.received_at.fixed_offset(),
        };

        let device_id = non_blank(self.device_id)
            .unwrap_or_else(|| context.fallback_device_id.trim().to_string());

        Ok(AttendanceEvent {
            device_id,
            employee_id,
            employee_name: non_blank(self.employee_name),
            timestamp,
            direction,
            raw_status,
            source: self.source.unwrap_or(context.default_source),
        })
    }
}

/// Parses the timestamp formats terminals are known to emit.
///
/// RFC 3339 keeps its offset. Values without an offset are taken as UTC.
pub fn parse_device_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];
    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    let value = value.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed);
    }

    if let Some(parsed) =
        OFFSET_FORMATS.iter().find_map(|format| DateTime::parse_from_str(value, format).ok())
    {
        return Some(parsed);
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Renders a timestamp as RFC 3339 with `Z` for a zero offset.
pub fn format_timestamp(timestamp: &DateTime<FixedOffset>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn serialize_timestamp<S: Serializer>(
    timestamp: &DateTime<FixedOffset>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(timestamp))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
