//! Device payload builders.
//!
//! Terminals push the same event in three shapes: an XML
//! `EventNotificationAlert`, an ISAPI JSON document, or a multipart form
//! whose `event_log` part holds either. [`AlertBuilder`] renders all three
//! from one description.

use serde_json::{json, Map, Value};

/// Boundary used by [`AlertBuilder::to_multipart`].
pub const MULTIPART_BOUNDARY: &str = "MIME_boundary";

/// A check-out alert as pushed by a face terminal without a device id.
pub const SAMPLE_CHECKOUT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<EventNotificationAlert version="2.0" xmlns="http://www.isapi.org/ver20/XMLSchema">
    <ipAddress>192.168.1.64</ipAddress>
    <portNo>80</portNo>
    <protocol>HTTP</protocol>
    <dateTime>2026-02-26T15:30:00+02:00</dateTime>
    <activePostCount>1</activePostCount>
    <eventType>AccessControllerEvent</eventType>
    <eventState>active</eventState>
    <AccessControllerEvent>
        <employeeNoString>1</employeeNoString>
        <name>azam</name>
        <attendanceStatus>checkOut</attendanceStatus>
    </AccessControllerEvent>
</EventNotificationAlert>"#;

/// Builder for attendance alerts.
#[derive(Debug, Clone)]
pub struct AlertBuilder {
    device_id: Option<String>,
    employee_id: Option<String>,
    name: Option<String>,
    date_time: Option<String>,
    status: Option<String>,
}

impl AlertBuilder {
    /// An alert for employee `1` checking in at a fixed time.
    pub fn check_in() -> Self {
        Self {
            device_id: None,
            employee_id: Some("1".to_string()),
            name: Some("azam".to_string()),
            date_time: Some("2026-02-26T08:00:00+02:00".to_string()),
            status: Some("checkIn".to_string()),
        }
    }

    /// Same as [`AlertBuilder::check_in`] but leaving.
    pub fn check_out() -> Self {
        Self::check_in().status("checkOut").date_time("2026-02-26T17:00:00+02:00")
    }

    /// Sets the device serial.
    pub fn device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Sets the badge number.
    pub fn employee_id(mut self, employee_id: impl Into<String>) -> Self {
        self.employee_id = Some(employee_id.into());
        self
    }

    /// Sets the display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the device time.
    pub fn date_time(mut self, date_time: impl Into<String>) -> Self {
        self.date_time = Some(date_time.into());
        self
    }

    /// Sets the raw attendance status.
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Drops the badge number.
    pub fn without_employee(mut self) -> Self {
        self.employee_id = None;
        self
    }

    /// Drops the device time.
    pub fn without_date_time(mut self) -> Self {
        self.date_time = None;
        self
    }

    /// Renders an `EventNotificationAlert` document.
    pub fn to_xml(&self) -> String {
        let tag = |name: &str, value: &Option<String>| {
            value.as_ref().map(|v| format!("<{name}>{v}</{name}>")).unwrap_or_default()
        };

        format!(
            concat!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
                "<EventNotificationAlert version=\"2.0\">",
                "{device}{date_time}<eventType>AccessControllerEvent</eventType>",
                "<AccessControllerEvent>{employee}{name}{status}</AccessControllerEvent>",
                "</EventNotificationAlert>"
            ),
            device = tag("deviceID", &self.device_id),
            date_time = tag("dateTime", &self.date_time),
            employee = tag("employeeNoString", &self.employee_id),
            name = tag("name", &self.name),
            status = tag("attendanceStatus", &self.status),
        )
    }

    /// Renders the ISAPI JSON shape with a nested `AccessControllerEvent`.
    pub fn to_isapi_json(&self) -> Value {
        let mut inner = Map::new();
        insert(&mut inner, "employeeNoString", &self.employee_id);
        insert(&mut inner, "name", &self.name);
        insert(&mut inner, "attendanceStatus", &self.status);

        let mut outer = Map::new();
        insert(&mut outer, "deviceID", &self.device_id);
        insert(&mut outer, "dateTime", &self.date_time);
        outer.insert("eventType".to_string(), json!("AccessControllerEvent"));
        outer.insert("AccessControllerEvent".to_string(), Value::Object(inner));
        Value::Object(outer)
    }

    /// Renders the flat JSON shape used by relays and integrations.
    pub fn to_flat_json(&self) -> Value {
        let mut object = Map::new();
        insert(&mut object, "deviceId", &self.device_id);
        insert(&mut object, "employeeId", &self.employee_id);
        insert(&mut object, "employeeName", &self.name);
        insert(&mut object, "timestamp", &self.date_time);
        insert(&mut object, "eventType", &self.status);
        Value::Object(object)
    }

    /// Wraps the ISAPI JSON in a multipart form next to a picture part.
    ///
    /// Returns the body and its content type.
    pub fn to_multipart(&self) -> (Vec<u8>, String) {
        let event_log = self.to_isapi_json().to_string();

        let mut body = Vec::new();
        body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"event_log\"\r\n");
        body.extend_from_slice(b"Content-Type: application/json\r\n\r\n");
        body.extend_from_slice(event_log.as_bytes());
        body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"Picture\"; filename=\"face.jpg\"\r\n",
        );
        body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
        body.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]);
        body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

        (body, format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"))
    }
}

fn insert(object: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        object.insert(key.to_string(), Value::String(value.clone()));
    }
}
