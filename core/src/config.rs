//! Archive configuration.
//!
//! Loaded from a TOML file named by `$LIST_ARCHIVE_CONFIG`, or from an
//! explicit path. Every section falls back to built-in defaults.
//!
//! ```toml
//! [storage]
//! path = "/var/lib/list-archive/archive.sqlite"
//! busy_timeout_ms = 5000
//!
//! [ingest]
//! max_retries = 5
//!
//! [[lists]]
//! name = "devel"
//! domain = "lists.example.org"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const CONFIG_ENV: &str = "LIST_ARCHIVE_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub storage: StorageConfig,
    pub ingest: IngestConfig,
    pub diagnostics: DiagnosticsConfig,
    pub lists: Vec<ListConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite archive file.
    pub path: PathBuf,
    /// How long a writer waits on the database lock before SQLITE_BUSY.
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Extra attempts after a transient conflict (busy database, uniqueness race).
    pub max_retries: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Directory holding the dead-letter log. Disabled when unset.
    pub dead_letter_dir: Option<PathBuf>,
}

/// One configured mailing list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListConfig {
    pub name: String,
    pub domain: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub subject_prefix: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("archive.sqlite"),
            busy_timeout_ms: 5_000,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { max_retries: 5 }
    }
}

impl ArchiveConfig {
    pub fn from_toml(contents: &str) -> Result<Self, CoreError> {
        let config: ArchiveConfig =
            toml::from_str(contents).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), CoreError> {
        for (idx, list) in self.lists.iter().enumerate() {
            if list.name.trim().is_empty() {
                return Err(CoreError::Config(format!("list #{} has an empty name", idx)));
            }
            if list.domain.trim().is_empty() {
                return Err(CoreError::Config(format!(
                    "list {} has an empty domain",
                    list.name
                )));
            }
            if self.lists[..idx].iter().any(|other| other.name == list.name) {
                return Err(CoreError::Config(format!("list {} is configured twice", list.name)));
            }
        }
        Ok(())
    }
}

/// Reads and validates a config file. Unlike the env lookup, a missing file
/// here is an error: the caller asked for it by name.
pub fn load_config_from(path: &Path) -> Result<ArchiveConfig, CoreError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))?;
    let config = ArchiveConfig::from_toml(&contents)?;
    tracing::info!(path = %path.display(), lists = config.lists.len(), "loaded config");
    Ok(config)
}

/// Loads the file named by `$LIST_ARCHIVE_CONFIG`, or defaults when unset.
pub fn load_config() -> Result<ArchiveConfig, CoreError> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) => load_config_from(Path::new(&path)),
        Err(_) => Ok(ArchiveConfig::default()),
    }
}
