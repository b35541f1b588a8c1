//! Device payload normalization.
//!
//! Terminals push the same notification in three shapes: an XML
//! `EventNotificationAlert`, a JSON object, or a `multipart/form-data` body
//! whose `event_log` part holds one of the other two. Each shape has an
//! extractor that collects raw fields into an [`EventBuilder`]; validation
//! and vocabulary mapping happen once, in [`EventBuilder::build`].

mod json;
mod multipart;
mod xml;

use std::sync::Arc;

use crate::{
    error::{NormalizationError, Result},
    models::{AttendanceEvent, EventBuilder, EventSource, ReceiptContext},
    time::Clock,
};

/// Recognized payload encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// Tag-based `EventNotificationAlert` document.
    Xml,
    /// JSON object.
    Json,
    /// `multipart/form-data` wrapping an XML or JSON part.
    Multipart,
}

/// Decides how to read a body.
///
/// A multipart content type (or a body opening with a `--` boundary line)
/// wins. Otherwise the first significant byte decides, since devices are
/// known to mislabel XML as `application/json` and vice versa.
///
/// # Errors
///
/// Returns `MalformedPayload` for empty bodies and bodies that are neither
/// XML nor JSON.
pub fn detect_shape(body: &[u8], content_type: Option<&str>) -> Result<PayloadShape> {
    let trimmed = trim_start(body);
    if trimmed.is_empty() {
        return Err(NormalizationError::malformed("empty body"));
    }

    let is_multipart = content_type
        .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/"));
    if is_multipart || trimmed.starts_with(b"--") {
        return Ok(PayloadShape::Multipart);
    }

    match trimmed[0] {
        b'<' => Ok(PayloadShape::Xml),
        b'{' => Ok(PayloadShape::Json),
        _ => Err(NormalizationError::malformed("body is neither XML nor JSON")),
    }
}

/// Normalizes a payload against an explicit receipt context.
///
/// Pure: the same bytes and context always yield the same result.
pub fn normalize_at(
    body: &[u8],
    content_type: Option<&str>,
    context: &ReceiptContext<'_>,
) -> Result<AttendanceEvent> {
    extract(body, content_type)?.build(context)
}

fn extract(body: &[u8], content_type: Option<&str>) -> Result<EventBuilder> {
    match detect_shape(body, content_type)? {
        PayloadShape::Xml => Ok(xml::extract(trim_start(body))),
        PayloadShape::Json => json::extract(trim_start(body)),
        PayloadShape::Multipart => {
            let part = multipart::event_part(body, content_type)?;
            match detect_shape(part, None)? {
                PayloadShape::Xml => Ok(xml::extract(trim_start(part))),
                PayloadShape::Json => json::extract(trim_start(part)),
                PayloadShape::Multipart => {
                    Err(NormalizationError::malformed("nested multipart is not supported"))
                },
            }
        },
    }
}

/// Strips leading whitespace and a UTF-8 byte order mark.
fn trim_start(body: &[u8]) -> &[u8] {
    let body = body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body);
    let start = body.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(body.len());
    &body[start..]
}

/// Defaults applied to every payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizerConfig {
    /// Device id used when neither the payload nor the request names one.
    pub default_device_id: String,
    /// Source tag used when the payload carries none.
    pub default_source: EventSource,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self { default_device_id: "admin".to_string(), default_source: EventSource::Webhook }
    }
}

/// Normalizer bound to configured defaults and a clock.
#[derive(Debug, Clone)]
pub struct Normalizer {
    config: NormalizerConfig,
    clock: Arc<dyn Clock>,
}

impl Normalizer {
    /// Creates a normalizer.
    pub fn new(config: NormalizerConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// Returns the configured defaults.
    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Normalizes a raw device body.
    ///
    /// # Errors
    ///
    /// Returns a [`NormalizationError`] when the payload cannot produce a
    /// valid event. No partial event is ever returned.
    pub fn normalize(&self, body: &[u8], content_type: Option<&str>) -> Result<AttendanceEvent> {
        self.normalize_from_device(body, content_type, None)
    }

    /// Normalizes a body received on a device-scoped route.
    ///
    /// `device_hint` sits between the payload's own device id and the
    /// configured fallback.
    pub fn normalize_from_device(
        &self,
        body: &[u8],
        content_type: Option<&str>,
        device_hint: Option<&str>,
    ) -> Result<AttendanceEvent> {
        let fallback = device_hint
            .map(str::trim)
            .filter(|hint| !hint.is_empty())
            .unwrap_or(&self.config.default_device_id);

        let context = ReceiptContext {
            fallback_device_id: fallback,
            default_source: self.config.default_source,
            received_at: self.clock.now_utc(),
        };

        normalize_at(body, content_type, &context)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{models::Direction, time::TestClock};

    fn normalizer() -> Normalizer {
        let clock = TestClock::with_start_time(Utc.with_ymd_and_hms(2026, 2, 26, 9, 0, 0).unwrap());
        Normalizer::new(NormalizerConfig::default(), Arc::new(clock))
    }

    #[test]
    fn detect_shape_sniffs_body() {
        assert_eq!(detect_shape(b"  <a/>", None), Ok(PayloadShape::Xml));
        assert_eq!(detect_shape(b"\n{}", Some("text/plain")), Ok(PayloadShape::Json));
        assert_eq!(detect_shape(b"<a/>", Some("application/json")), Ok(PayloadShape::Xml));
        assert_eq!(
            detect_shape(b"--x\r\n", Some("multipart/form-data; boundary=x")),
            Ok(PayloadShape::Multipart)
        );
    }

    #[test]
    fn detect_shape_rejects_unknown_bodies() {
        assert_eq!(detect_shape(b"", None).unwrap_err().reason(), "malformed_payload");
        assert_eq!(detect_shape(b"   ", None).unwrap_err().reason(), "malformed_payload");
        assert_eq!(detect_shape(b"employee=1", None).unwrap_err().reason(), "malformed_payload");
    }

    #[test]
    fn byte_order_mark_is_ignored() {
        let body = b"\xEF\xBB\xBF{\"employeeId\":\"4\",\"eventType\":\"checkin\"}";
        let event = normalizer().normalize(body, None).unwrap();
        assert_eq!(event.employee_id(), "4");
    }

    #[test]
    fn device_hint_sits_below_payload_device() {
        let normalizer = normalizer();
        let with_device = br#"{"deviceId":"A1","employeeId":"1","eventType":"1"}"#;
        let without_device = br#"{"employeeId":"1","eventType":"1"}"#;

        let event = normalizer.normalize_from_device(with_device, None, Some("B2")).unwrap();
        assert_eq!(event.device_id(), "A1");

        let event = normalizer.normalize_from_device(without_device, None, Some("B2")).unwrap();
        assert_eq!(event.device_id(), "B2");

        let event = normalizer.normalize_from_device(without_device, None, Some(" ")).unwrap();
        assert_eq!(event.device_id(), "admin");
    }

    #[test]
    fn missing_timestamp_uses_clock() {
        let body = b"<x><employeeNoString>9</employeeNoString><attendanceStatus>2</attendanceStatus></x>";
        let event = normalizer().normalize(body, None).unwrap();

        assert_eq!(event.direction(), Direction::Out);
        assert_eq!(event.timestamp_rfc3339(), "2026-02-26T09:00:00Z");
    }
}
