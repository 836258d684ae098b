//! Header sanitizing: Message-ID, Subject, Date and the parent reference.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use mail_parser::MessageParser;
use sha2::{Digest, Sha256};

use crate::error::CoreError;
use crate::rfc822::RawMessage;

/// Stored identifiers are cut to this many characters. The same cut applies
/// to identifiers read from In-Reply-To/References, so a reply that quotes
/// the untruncated form still finds its parent.
pub const MAX_MESSAGE_ID_CHARS: usize = 254;
pub const MAX_SUBJECT_CHARS: usize = 512;

#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedHeaders {
    pub message_id: String,
    pub message_id_hash: String,
    pub subject: String,
    pub date: DateTime<Utc>,
    /// Offset from UTC of the original Date header, in minutes.
    pub timezone: i32,
    /// Immediate parent candidate: last References entry, else In-Reply-To.
    pub parent_candidate: Option<String>,
}

/// Extracts the sanitized Message-ID, or fails with `MissingMessageId`.
pub fn extract_message_id(raw: &RawMessage) -> Result<String, CoreError> {
    raw.header("Message-ID")
        .map(decode_header_bytes)
        .and_then(|v| sanitize_message_id(&v))
        .ok_or(CoreError::MissingMessageId)
}

pub fn sanitize_headers(raw: &RawMessage) -> Result<SanitizedHeaders, CoreError> {
    let message_id = extract_message_id(raw)?;
    let subject = raw
        .header("Subject")
        .map(|v| decode_header_words(decode_header_bytes(v).trim()))
        .map(|s| truncate_chars(&s, MAX_SUBJECT_CHARS))
        .unwrap_or_default();

    let parsed_date = raw
        .header("Date")
        .map(decode_header_bytes)
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| {
            let parsed = parse_date(&v);
            if parsed.is_none() {
                tracing::warn!(date = %v, message_id = %message_id, "could not parse Date header, using ingestion time");
            }
            parsed
        });
    let (date, timezone) = match parsed_date {
        Some(dt) => (dt.with_timezone(&Utc), dt.offset().local_minus_utc() / 60),
        None => (ingestion_time(), 0),
    };

    let parent_candidate = match raw.header("References").map(decode_header_bytes) {
        Some(refs) if !refs.trim().is_empty() => parse_references(&refs).pop(),
        _ => raw
            .header("In-Reply-To")
            .map(decode_header_bytes)
            .and_then(|v| parse_references(&v).into_iter().next()),
    };

    Ok(SanitizedHeaders {
        message_id_hash: hash_sanitized_id(&message_id),
        message_id,
        subject,
        date,
        timezone,
        parent_candidate,
    })
}

/// Strips the surrounding angle brackets and truncates. `None` for an empty id.
pub fn sanitize_message_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let inner = match trimmed.find('<') {
        Some(start) => match trimmed[start + 1..].find('>') {
            Some(end) => &trimmed[start + 1..start + 1 + end],
            None => &trimmed[start + 1..],
        },
        None => trimmed,
    };
    let inner = inner.trim();
    if inner.is_empty() {
        return None;
    }
    Some(truncate_chars(inner, MAX_MESSAGE_ID_CHARS))
}

/// Hash of a header-form Message-ID (`<id>` or bare); a thread's public id
/// is the hash of its root message.
pub fn message_id_hash(message_id: &str) -> String {
    hash_sanitized_id(&sanitize_message_id(message_id).unwrap_or_default())
}

/// Hash of an id that already went through [`sanitize_message_id`].
/// Sanitizing twice is not stable (`a<b` would become `b`).
pub fn hash_sanitized_id(message_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(message_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Identifiers of a References or In-Reply-To header, in header order.
pub fn parse_references(raw: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut remaining = raw;
    while let Some(start) = remaining.find('<') {
        match remaining[start..].find('>') {
            Some(end) => {
                if let Some(id) = sanitize_message_id(&remaining[start..start + end + 1]) {
                    ids.push(id);
                }
                remaining = &remaining[start + end + 1..];
            }
            None => break,
        }
    }
    if ids.is_empty() {
        ids.extend(raw.split_whitespace().filter_map(sanitize_message_id));
    }
    ids
}

/// Parses a Date header into an instant with its original offset. Naive
/// dates (no zone) are taken as UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = strip_trailing_comment(raw.trim());
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt);
    }

    let no_dow = strip_day_of_week(trimmed);
    const ZONED: &[&str] = &[
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M %z",
        "%Y-%m-%d %H:%M:%S %z",
    ];
    const NAIVE: &[&str] = &["%d %b %Y %H:%M:%S", "%d %b %Y %H:%M", "%Y-%m-%d %H:%M:%S"];
    for fmt in ZONED {
        if let Ok(dt) = DateTime::parse_from_str(no_dow, fmt) {
            return Some(dt);
        }
    }
    let utc = FixedOffset::east_opt(0)?;
    for fmt in NAIVE {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(no_dow, fmt) {
            return Some(utc.from_utc_datetime(&ndt));
        }
    }
    None
}

/// Current time, rounded up to the microsecond precision dates are stored
/// with, so a stored fallback date is never earlier than a clock reading
/// taken before ingestion started.
pub fn ingestion_time() -> DateTime<Utc> {
    let now = Utc::now();
    let round_up = i64::from(now.timestamp_subsec_nanos() % 1_000 != 0);
    Utc.timestamp_micros(now.timestamp_micros() + round_up)
        .single()
        .unwrap_or(now)
}

/// Decodes RFC 2047 encoded-words; text without them is returned as is.
pub fn decode_header_words(raw: &str) -> String {
    if !raw.contains("=?") {
        return raw.to_string();
    }
    let wrapped = format!("Subject: {}\r\n\r\n", raw);
    MessageParser::default()
        .parse(wrapped.as_bytes())
        .and_then(|msg| msg.subject().map(|s| s.to_string()))
        .unwrap_or_else(|| raw.to_string())
}

/// UTF-8 when valid, Windows-1252 otherwise (every byte decodes).
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

fn strip_day_of_week(s: &str) -> &str {
    match s.find(',') {
        Some(idx) if s[..idx].chars().all(|c| c.is_ascii_alphabetic()) => s[idx + 1..].trim(),
        _ => s,
    }
}

fn strip_trailing_comment(s: &str) -> &str {
    if s.ends_with(')') {
        if let Some(open) = s.rfind('(') {
            return s[..open].trim_end();
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_brackets_and_truncation() {
        assert_eq!(sanitize_message_id("<dummy>").as_deref(), Some("dummy"));
        assert_eq!(sanitize_message_id("  plain@id ").as_deref(), Some("plain@id"));
        assert_eq!(sanitize_message_id("<>"), None);
        let long = format!("<{}>", "X".repeat(260));
        assert_eq!(sanitize_message_id(&long), Some("X".repeat(254)));
        assert_eq!(sanitize_message_id(&"X".repeat(260)), Some("X".repeat(254)));
    }

    #[test]
    fn hash_ignores_brackets() {
        assert_eq!(message_id_hash("<id1_1>"), message_id_hash("id1_1"));
        assert_eq!(message_id_hash("id1_1").len(), 64);
        assert_ne!(message_id_hash("id1_1"), message_id_hash("id2_1"));
    }

    #[test]
    fn stored_id_hash_is_not_resanitized() {
        let raw = RawMessage::new().with_header("Message-ID", "<a<b>");
        let headers = sanitize_headers(&raw).expect("sanitize");
        assert_eq!(headers.message_id, "a<b");
        assert_eq!(headers.message_id_hash, message_id_hash("<a<b>"));
        assert_ne!(headers.message_id_hash, message_id_hash("<b>"));
    }

    #[test]
    fn references_keep_order() {
        let refs = parse_references("<a@x> <b@x>\r\n <c@x>");
        assert_eq!(refs, vec!["a@x", "b@x", "c@x"]);
        assert_eq!(parse_references("bare@x"), vec!["bare@x"]);
    }

    #[test]
    fn naive_date_is_utc() {
        let dt = parse_date("Fri, 02 Nov 2012 16:07:54").expect("parse");
        assert_eq!(dt.offset().local_minus_utc(), 0);
        assert_eq!(dt.with_timezone(&Utc).to_rfc3339(), "2012-11-02T16:07:54+00:00");
    }

    #[test]
    fn aware_date_keeps_offset() {
        let dt = parse_date("Fri, 02 Nov 2012 16:07:54 +0100").expect("parse");
        assert_eq!(dt.offset().local_minus_utc() / 60, 60);
        assert_eq!(dt.with_timezone(&Utc).to_rfc3339(), "2012-11-02T15:07:54+00:00");
    }

    #[test]
    fn date_with_zone_comment() {
        let dt = parse_date("Fri, 02 Nov 2012 16:07:54 -0500 (EST)").expect("parse");
        assert_eq!(dt.offset().local_minus_utc() / 60, -300);
    }

    #[test]
    fn garbage_date_is_none() {
        assert!(parse_date("not a date").is_none());
    }

    #[test]
    fn sanitize_uses_last_reference() {
        let raw = RawMessage::new()
            .with_header("Message-ID", "<child>")
            .with_header("In-Reply-To", "<ignored>")
            .with_header("References", "<root> <parent>");
        let headers = sanitize_headers(&raw).expect("sanitize");
        assert_eq!(headers.parent_candidate.as_deref(), Some("parent"));

        let raw = RawMessage::new()
            .with_header("Message-ID", "<child>")
            .with_header("In-Reply-To", "<parent>");
        let headers = sanitize_headers(&raw).expect("sanitize");
        assert_eq!(headers.parent_candidate.as_deref(), Some("parent"));
    }

    #[test]
    fn subject_truncated_and_decoded() {
        let raw = RawMessage::new()
            .with_header("Message-ID", "<s>")
            .with_header("Subject", "x".repeat(600));
        assert_eq!(sanitize_headers(&raw).expect("ok").subject.chars().count(), 512);

        let raw = RawMessage::new()
            .with_header("Message-ID", "<s>")
            .with_header("Subject", "=?UTF-8?B?SG9sYQ==?=");
        assert_eq!(sanitize_headers(&raw).expect("ok").subject, "Hola");
    }

    #[test]
    fn missing_message_id() {
        let raw = RawMessage::new().with_header("Subject", "hi");
        assert!(matches!(sanitize_headers(&raw), Err(CoreError::MissingMessageId)));
        let raw = RawMessage::new().with_header("Message-ID", "  ");
        assert!(matches!(extract_message_id(&raw), Err(CoreError::MissingMessageId)));
    }

    #[test]
    fn missing_date_uses_now() {
        let before = Utc::now();
        let raw = RawMessage::new().with_header("Message-ID", "<d>");
        let headers = sanitize_headers(&raw).expect("ok");
        assert!(headers.date >= before);
        assert_eq!(headers.timezone, 0);
    }
}
