//! JSON payload extraction.
//!
//! Accepts the flat relay shape (`deviceId`, `employeeId`, `eventType`, ...)
//! and the terminal's own event log shape, where the employee fields live in
//! a nested `AccessControllerEvent` object.

use serde_json::{Map, Value};

use crate::{
    error::{NormalizationError, Result},
    models::{EventBuilder, EventSource},
};

const DEVICE_KEYS: &[&str] = &["deviceId", "deviceID"];
const EMPLOYEE_KEYS: &[&str] = &["employeeId", "employeeNoString"];
const NAME_KEYS: &[&str] = &["employeeName", "name"];
const TIMESTAMP_KEYS: &[&str] = &["timestamp", "dateTime"];
const STATUS_KEYS: &[&str] = &["eventType", "attendanceStatus", "action"];
const NESTED_EVENT_KEY: &str = "AccessControllerEvent";

pub(super) fn extract(body: &[u8]) -> Result<EventBuilder> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| NormalizationError::malformed(format!("invalid JSON: {e}")))?;

    let Value::Object(root) = value else {
        return Err(NormalizationError::malformed("JSON payload is not an object"));
    };
    let nested = root.get(NESTED_EVENT_KEY).and_then(Value::as_object);

    // Employee fields prefer the nested event; the envelope carries a generic
    // `eventType` that must not shadow the nested `attendanceStatus`.
    let employee_field =
        |keys: &[&str]| nested.and_then(|n| lookup(n, keys)).or_else(|| lookup(&root, keys));
    let envelope_field =
        |keys: &[&str]| lookup(&root, keys).or_else(|| nested.and_then(|n| lookup(n, keys)));

    Ok(EventBuilder {
        device_id: envelope_field(DEVICE_KEYS),
        employee_id: employee_field(EMPLOYEE_KEYS),
        employee_name: employee_field(NAME_KEYS),
        timestamp: envelope_field(TIMESTAMP_KEYS),
        status: employee_field(STATUS_KEYS),
        source: root.get("source").and_then(Value::as_str).and_then(EventSource::parse),
    })
}

/// First key whose value is a non-null string or number.
fn lookup(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match object.get(*key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
