//! Turning files on disk into raw messages.
//!
//! A file whose first line starts with `From ` is treated as an mbox and
//! split on every `From ` line that follows a blank line; anything else is a
//! single RFC 822 message.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

/// One message's bytes plus where it came from, for logs and the
/// dead-letter file.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub label: String,
    pub bytes: Vec<u8>,
}

pub fn load_sources(paths: &[PathBuf]) -> anyhow::Result<Vec<Source>> {
    let mut sources = Vec::new();
    for path in paths {
        collect(path, &mut sources)?;
    }
    Ok(sources)
}

fn collect(path: &Path, out: &mut Vec<Source>) -> anyhow::Result<()> {
    if path.is_dir() {
        let mut entries: Vec<PathBuf> = fs::read_dir(path)
            .with_context(|| format!("reading directory {}", path.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        entries.sort();
        for entry in entries {
            collect(&entry, out)?;
        }
        return Ok(());
    }

    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let label = path.display().to_string();
    if is_mbox(&data) {
        let messages = split_mbox(&data);
        tracing::debug!(path = %label, messages = messages.len(), "split mbox");
        for (idx, bytes) in messages.into_iter().enumerate() {
            out.push(Source {
                label: format!("{}#{}", label, idx + 1),
                bytes,
            });
        }
    } else {
        out.push(Source { label, bytes: data });
    }
    Ok(())
}

fn is_mbox(data: &[u8]) -> bool {
    data.starts_with(b"From ")
}

/// Splits mbox content into messages, dropping the `From ` separator lines
/// and undoing `>From ` quoting.
pub fn split_mbox(data: &[u8]) -> Vec<Vec<u8>> {
    let mut messages: Vec<Vec<u8>> = Vec::new();
    let mut current: Option<Vec<u8>> = None;
    let mut prev_blank = true;

    for line in data.split_inclusive(|&b| b == b'\n') {
        if prev_blank && line.starts_with(b"From ") {
            if let Some(done) = current.take() {
                messages.push(finish(done));
            }
            current = Some(Vec::new());
            prev_blank = false;
            continue;
        }
        let blank = line == b"\n" || line == b"\r\n";
        if let Some(buf) = current.as_mut() {
            match line.strip_prefix(b">") {
                Some(rest) if is_quoted_from(rest) => buf.extend_from_slice(rest),
                _ => buf.extend_from_slice(line),
            }
        }
        prev_blank = blank;
    }
    if let Some(done) = current.take() {
        messages.push(finish(done));
    }
    messages.retain(|m| !m.is_empty());
    messages
}

fn is_quoted_from(rest: &[u8]) -> bool {
    let unquoted = rest.iter().position(|&b| b != b'>').map(|p| &rest[p..]);
    matches!(unquoted, Some(line) if line.starts_with(b"From "))
}

/// Drops the blank separator line mbox writers put before the next `From `.
fn finish(mut message: Vec<u8>) -> Vec<u8> {
    if message.ends_with(b"\r\n\r\n") {
        message.truncate(message.len() - 2);
    } else if message.ends_with(b"\n\n") {
        message.truncate(message.len() - 1);
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    const MBOX: &[u8] = b"From alice@example.com Mon Jan  1 10:00:00 2024\n\
Message-ID: <a>\n\
\n\
Hello\n\
>From here on\n\
\n\
From bob@example.com Mon Jan  1 11:00:00 2024\n\
Message-ID: <b>\n\
\n\
Bye\n";

    #[test]
    fn mbox_is_split_on_separator_lines() {
        let messages = split_mbox(MBOX);
        assert_eq!(messages.len(), 2);
        assert_eq!(
            String::from_utf8_lossy(&messages[0]),
            "Message-ID: <a>\n\nHello\nFrom here on\n"
        );
        assert_eq!(String::from_utf8_lossy(&messages[1]), "Message-ID: <b>\n\nBye\n");
    }

    #[test]
    fn from_inside_body_without_blank_line_is_kept() {
        let data = b"From x Mon Jan  1 10:00:00 2024\nSubject: s\n\nline\nFrom the docs\n";
        let messages = split_mbox(data);
        assert_eq!(messages.len(), 1);
        assert!(String::from_utf8_lossy(&messages[0]).contains("From the docs"));
    }

    #[test]
    fn directories_and_single_files_are_loaded() {
        let dir = tempfile::tempdir().expect("temp");
        fs::write(dir.path().join("a.eml"), b"Message-ID: <a>\n\nbody\n").expect("eml");
        fs::write(dir.path().join("b.mbox"), MBOX).expect("mbox");
        let sources = load_sources(&[dir.path().to_path_buf()]).expect("load");
        assert_eq!(sources.len(), 3);
        assert!(sources[0].label.ends_with("a.eml"));
        assert!(sources[1].label.ends_with("b.mbox#1"));
        assert!(sources[2].label.ends_with("b.mbox#2"));
    }
}
