//! Tag extraction for `EventNotificationAlert` documents.
//!
//! Device XML is flat enough that a full parser buys nothing; each field is
//! the text of the first element with that name, attributes allowed.

use std::{borrow::Cow, sync::LazyLock};

use regex::Regex;

use crate::models::EventBuilder;

struct TagPattern {
    device_id: Regex,
    employee_id: Regex,
    employee_name: Regex,
    timestamp: Regex,
    status: Regex,
}

static TAGS: LazyLock<TagPattern> = LazyLock::new(|| TagPattern {
    device_id: tag_regex("deviceID"),
    employee_id: tag_regex("employeeNoString"),
    employee_name: tag_regex("name"),
    timestamp: tag_regex("dateTime"),
    status: tag_regex("attendanceStatus"),
});

#[allow(clippy::expect_used)] // Tag names are fixed identifiers
fn tag_regex(tag: &str) -> Regex {
    Regex::new(&format!(r"<{tag}(?:\s[^>]*)?>([^<]*)</{tag}>")).expect("tag pattern is valid")
}

pub(super) fn extract(body: &[u8]) -> EventBuilder {
    let text = String::from_utf8_lossy(body);
    let field = |pattern: &Regex| {
        pattern
            .captures(&text)
            .and_then(|captures| captures.get(1))
            .map(|m| decode_entities(m.as_str()).into_owned())
    };

    EventBuilder {
        device_id: field(&TAGS.device_id),
        employee_id: field(&TAGS.employee_id),
        employee_name: field(&TAGS.employee_name),
        timestamp: field(&TAGS.timestamp),
        status: field(&TAGS.status),
        source: None,
    }
}

fn decode_entities(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }

    Cow::Owned(
        raw.replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&apos;", "'")
            .replace("&amp;", "&"),
    )
}
