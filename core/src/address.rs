//! Sender normalization for the `From` header.

use crate::error::CoreError;
use crate::headers::decode_header_words;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub name: String,
    pub address: String,
}

/// Turns a raw `From` value into a `(name, address)` pair scoped to a list
/// domain.
///
/// - absent or blank header: `("", "unknown@<domain>")`
/// - display name without an address: the name, whitespace and non-ASCII
///   characters removed and lower-cased, becomes the local part (`unknown`
///   when nothing is left)
/// - the address is always lower-cased
///
/// Raw non-ASCII bytes in the address part cannot be decoded into a valid
/// address and reject the message with [`CoreError::InvalidAddress`].
pub fn normalize_sender(raw: Option<&[u8]>, domain: &str) -> Result<Sender, CoreError> {
    let raw = match raw {
        Some(raw) if !raw.iter().all(|b| b.is_ascii_whitespace()) => raw,
        _ => return Ok(unknown_sender(domain)),
    };

    let (name_bytes, addr_bytes) = split_from(raw);
    if !addr_bytes.is_ascii() {
        return Err(CoreError::InvalidAddress(
            String::from_utf8_lossy(addr_bytes).into_owned(),
        ));
    }

    let name = decode_display_name(name_bytes);
    let address = String::from_utf8_lossy(addr_bytes).trim().to_lowercase();

    if !address.is_empty() {
        return Ok(Sender { name, address });
    }
    let local: String = name
        .chars()
        .filter(|c| is_atext(*c))
        .collect::<String>()
        .to_ascii_lowercase();
    if local.is_empty() {
        return Ok(Sender {
            name,
            address: format!("unknown@{}", domain),
        });
    }
    Ok(Sender {
        address: format!("{}@{}", local, domain),
        name,
    })
}

/// Characters allowed unquoted in the local part of an address (RFC 5322
/// `atext` plus the dot). Whitespace and anything non-ASCII is dropped.
fn is_atext(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-/=?^_`{|}~.".contains(c)
}

fn unknown_sender(domain: &str) -> Sender {
    Sender {
        name: String::new(),
        address: format!("unknown@{}", domain),
    }
}

/// Splits a `From` value into (display-name bytes, address bytes). Handles
/// `Name <addr>`, `<addr>`, `addr (Name)`, a bare `addr`, and a bare name.
fn split_from(raw: &[u8]) -> (&[u8], &[u8]) {
    let raw = trim(raw);
    if let Some(open) = raw.iter().rposition(|&b| b == b'<') {
        if let Some(close) = raw[open..].iter().position(|&b| b == b'>') {
            return (&raw[..open], &raw[open + 1..open + close]);
        }
    }
    if let Some(open) = raw.iter().position(|&b| b == b'(') {
        if raw.last() == Some(&b')') && raw[..open].contains(&b'@') {
            return (&raw[open + 1..raw.len() - 1], &raw[..open]);
        }
    }
    if raw.contains(&b'@') {
        return (&[], raw);
    }
    (raw, &[])
}

fn decode_display_name(bytes: &[u8]) -> String {
    let text = match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    };
    let decoded = decode_header_words(text.trim());
    strip_quotes(&decoded)
}

fn strip_quotes(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

fn trim(bytes: &[u8]) -> &[u8] {
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
