//! The raw message handed to `ingest`.
//!
//! Header values are kept as bytes. Mailers do send raw 8-bit headers, and
//! whether such a header is acceptable is decided later by the component that
//! interprets it (see `address::normalize_sender`).

use mail_parser::{MessageParser, MimeHeaders};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMessage {
    headers: Vec<(String, Vec<u8>)>,
    pub body: String,
    pub attachments: Vec<RawAttachment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawAttachment {
    pub name: String,
    pub content_type: String,
    pub encoding: Option<String>,
    pub content: Vec<u8>,
}

impl RawMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: &str, value: impl AsRef<[u8]>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    pub fn with_attachment(mut self, attachment: RawAttachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Replaces every existing value of `name`, or appends it.
    pub fn set_header(&mut self, name: &str, value: impl AsRef<[u8]>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.as_ref().to_vec()));
    }

    /// First value of `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// Header value as text; invalid UTF-8 is replaced, not rejected.
    pub fn header_text(&self, name: &str) -> Option<String> {
        self.header(name)
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Parses a complete RFC 822 message. Headers are unfolded here, on bytes;
    /// the body text and attachment parts come from `mail-parser`.
    pub fn parse(raw: &[u8]) -> Self {
        let raw = skip_from_line(raw);
        let (header_block, body_block) = split_header_block(raw);
        let headers = unfold_headers(header_block);

        let (body, attachments) = match MessageParser::default().parse(raw) {
            Some(parsed) => {
                let body = parsed
                    .body_text(0)
                    .map(|s| s.into_owned())
                    .unwrap_or_default();
                let attachments = parsed
                    .attachments()
                    .enumerate()
                    .map(|(idx, part)| {
                        let name = part
                            .attachment_name()
                            .map(String::from)
                            .unwrap_or_else(|| format!("attachment-{}", idx + 1));
                        let content_type = part
                            .content_type()
                            .map(|ct: &mail_parser::ContentType| match ct.subtype() {
                                Some(sub) => format!("{}/{}", ct.ctype(), sub),
                                None => ct.ctype().to_string(),
                            })
                            .unwrap_or_else(|| "application/octet-stream".to_string());
                        RawAttachment {
                            name,
                            content_type: content_type.to_lowercase(),
                            encoding: part.content_transfer_encoding().map(String::from),
                            content: part.contents().to_vec(),
                        }
                    })
                    .collect();
                (body, attachments)
            }
            None => (String::from_utf8_lossy(body_block).into_owned(), Vec::new()),
        };

        Self {
            headers,
            body,
            attachments,
        }
    }
}

/// Skips an mbox `From ` separator line, if present.
fn skip_from_line(data: &[u8]) -> &[u8] {
    if data.starts_with(b"From ") {
        match data.iter().position(|&b| b == b'\n') {
            Some(pos) => &data[pos + 1..],
            None => &[],
        }
    } else {
        data
    }
}

fn split_header_block(data: &[u8]) -> (&[u8], &[u8]) {
    let mut line_start = 0;
    while line_start < data.len() {
        let line_end = data[line_start..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|p| line_start + p + 1)
            .unwrap_or(data.len());
        let line = &data[line_start..line_end];
        if line == b"\n" || line == b"\r\n" {
            return (&data[..line_start], &data[line_end..]);
        }
        line_start = line_end;
    }
    (data, &[])
}

fn unfold_headers(block: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut result: Vec<(String, Vec<u8>)> = Vec::new();
    for line in block.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        if line[0] == b' ' || line[0] == b'\t' {
            if let Some(last) = result.last_mut() {
                last.1.push(b' ');
                last.1.extend_from_slice(trim_bytes(line));
            }
        } else if let Some(colon) = line.iter().position(|&b| b == b':') {
            let name = String::from_utf8_lossy(&line[..colon]).trim().to_string();
            let value = trim_bytes(&line[colon + 1..]).to_vec();
            result.push((name, value));
        }
    }
    result
}

fn trim_bytes(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map(|p| p + 1)
        .unwrap_or(start);
    &bytes[start..end]
}
