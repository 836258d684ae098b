//! Dead-letter log for messages the archive refused.
//!
//! One JSON object per line in `<dir>/rejected.log`. The file is cut in half
//! (keeping the newest half) once it grows past `MAX_LOG_BYTES`.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const MAX_LOG_BYTES: u64 = 1_500_000;
pub const DEAD_LETTER_FILE: &str = "rejected.log";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub ts: String,
    pub list: String,
    pub source: String,
    pub message_id: Option<String>,
    pub kind: String,
    pub error: String,
}

impl Rejection {
    pub fn new(list: &str, source: &str, message_id: Option<String>, err: &CoreError) -> Self {
        Self {
            ts: Utc::now().to_rfc3339(),
            list: list.to_string(),
            source: source.to_string(),
            message_id,
            kind: error_kind(err).to_string(),
            error: err.to_string(),
        }
    }
}

pub fn error_kind(err: &CoreError) -> &'static str {
    match err {
        CoreError::MissingMessageId => "missing_message_id",
        CoreError::InvalidAddress(_) => "invalid_address",
        CoreError::UnknownList(_) => "unknown_list",
        CoreError::Sqlite(_) => "storage",
        CoreError::CorruptChain { .. } => "corrupt_chain",
        CoreError::InvalidArgument(_) | CoreError::Config(_) | CoreError::Io(_) => "other",
    }
}

pub fn log_rejection(log_dir: &Path, rejection: &Rejection) -> io::Result<()> {
    fs::create_dir_all(log_dir)?;
    let path = log_dir.join(DEAD_LETTER_FILE);
    trim_log(&path)?;
    let line = serde_json::to_string(rejection).unwrap_or_else(|_| "{}".to_string());
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

pub fn read_rejections(log_dir: &Path) -> io::Result<Vec<Rejection>> {
    let path = log_dir.join(DEAD_LETTER_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = fs::read_to_string(&path)?;
    Ok(data
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}

fn trim_log(path: &Path) -> io::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let meta = fs::metadata(path)?;
    if meta.len() <= MAX_LOG_BYTES {
        return Ok(());
    }
    let data = fs::read(path)?;
    let mut keep_from = data.len().saturating_sub((MAX_LOG_BYTES / 2) as usize);
    // restart on a line boundary so every kept line still parses
    if let Some(pos) = data[keep_from..].iter().position(|&b| b == b'\n') {
        keep_from += pos + 1;
    }
    fs::write(path, &data[keep_from..])?;
    Ok(())
}
