//! Locates the event part of a `multipart/form-data` device push.
//!
//! Terminals with cameras send the event next to one or more JPEG parts.
//! Only the event part matters; pictures are skipped without decoding.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{NormalizationError, Result};

const EVENT_PART_NAME: &str = "event_log";

#[allow(clippy::expect_used)] // Literal patterns
static BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)boundary="?([^";,\s]+)"?"#).expect("valid boundary pattern")
});

#[allow(clippy::expect_used)] // Literal patterns
static PART_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)(?:^|[;\s])name="([^"]*)""#).expect("valid name pattern"));

struct Part<'a> {
    name: Option<String>,
    content: &'a [u8],
}

/// Returns the bytes of the part holding the event.
///
/// The `event_log` part wins; otherwise the first part whose content looks
/// like JSON or XML.
pub(super) fn event_part<'a>(body: &'a [u8], content_type: Option<&str>) -> Result<&'a [u8]> {
    let boundary = boundary_from_header(content_type)
        .or_else(|| boundary_from_body(body))
        .ok_or_else(|| NormalizationError::malformed("multipart body without boundary"))?;

    let parts = split_parts(body, boundary.as_bytes());

    parts
        .iter()
        .find(|part| part.name.as_deref() == Some(EVENT_PART_NAME))
        .or_else(|| parts.iter().find(|part| looks_structured(part.content)))
        .map(|part| part.content)
        .ok_or_else(|| NormalizationError::malformed("multipart body has no event part"))
}

fn boundary_from_header(content_type: Option<&str>) -> Option<String> {
    BOUNDARY.captures(content_type?).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
}

/// Reads the boundary from the opening delimiter line.
fn boundary_from_body(body: &[u8]) -> Option<String> {
    let start = body.iter().position(|b| !b.is_ascii_whitespace())?;
    let line = body[start..].strip_prefix(b"--")?;
    let end = line.iter().position(|b| *b == b'\r' || *b == b'\n').unwrap_or(line.len());
    let boundary = std::str::from_utf8(&line[..end]).ok()?.trim();
    (!boundary.is_empty()).then(|| boundary.to_string())
}

fn split_parts<'a>(body: &'a [u8], boundary: &[u8]) -> Vec<Part<'a>> {
    let mut delimiter = Vec::with_capacity(boundary.len() + 2);
    delimiter.extend_from_slice(b"--");
    delimiter.extend_from_slice(boundary);

    let mut parts = Vec::new();
    let mut rest = match find(body, &delimiter) {
        Some(index) => &body[index + delimiter.len()..],
        None => return parts,
    };

    loop {
        if rest.starts_with(b"--") {
            break;
        }

        let (segment, next) = match find(rest, &delimiter) {
            Some(index) => (&rest[..index], Some(&rest[index + delimiter.len()..])),
            None => (rest, None),
        };

        if let Some(part) = parse_part(segment) {
            parts.push(part);
        }

        match next {
            Some(next) => rest = next,
            None => break,
        }
    }

    parts
}

fn parse_part(segment: &[u8]) -> Option<Part<'_>> {
    let segment = strip_line_break_start(segment);
    let (headers, content) = match find(segment, b"\r\n\r\n") {
        Some(index) => (&segment[..index], &segment[index + 4..]),
        None => {
            let index = find(segment, b"\n\n")?;
            (&segment[..index], &segment[index + 2..])
        },
    };

    let headers = String::from_utf8_lossy(headers);
    let name = headers
        .lines()
        .filter(|line| line.to_ascii_lowercase().starts_with("content-disposition"))
        .find_map(|line| PART_NAME.captures(line).and_then(|c| c.get(1)))
        .map(|m| m.as_str().to_string());

    Some(Part { name, content: strip_line_break_end(content) })
}

fn looks_structured(content: &[u8]) -> bool {
    content.iter().find(|b| !b.is_ascii_whitespace()).is_some_and(|b| *b == b'{' || *b == b'<')
}

fn strip_line_break_start(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\r\n").or_else(|| bytes.strip_prefix(b"\n")).unwrap_or(bytes)
}

fn strip_line_break_end(bytes: &[u8]) -> &[u8] {
    bytes.strip_suffix(b"\r\n").or_else(|| bytes.strip_suffix(b"\n")).unwrap_or(bytes)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}
