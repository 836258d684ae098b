use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;

use crate::config::StorageConfig;
use crate::error::CoreError;
use crate::migrations::MIGRATIONS;

pub struct ArchiveDb {
    pub path: PathBuf,
    pub conn: Connection,
}

pub fn open_archive(path: impl AsRef<Path>) -> Result<ArchiveDb, CoreError> {
    open_archive_with(path, &StorageConfig::default())
}

/// Opens (creating if needed) the archive database. Every ingestion worker
/// gets its own connection; WAL lets readers proceed while one writer holds
/// the immediate transaction.
pub fn open_archive_with(
    path: impl AsRef<Path>,
    storage: &StorageConfig,
) -> Result<ArchiveDb, CoreError> {
    let path = path.as_ref().to_path_buf();
    let conn = Connection::open(&path)?;
    conn.busy_timeout(Duration::from_millis(storage.busy_timeout_ms))?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL; \
         PRAGMA synchronous = NORMAL; \
         PRAGMA foreign_keys = ON; \
         PRAGMA journal_size_limit = 67108864; \
         PRAGMA temp_store = MEMORY;",
    )?;
    apply_migrations(&conn)?;
    Ok(ArchiveDb { path, conn })
}

pub fn apply_migrations(conn: &Connection) -> Result<(), CoreError> {
    let current_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let mut version = current_version as usize;
    for (idx, sql) in MIGRATIONS.iter().enumerate() {
        let next_version = idx + 1;
        if next_version <= version {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute_batch(&format!("PRAGMA user_version = {};", next_version))?;
        tracing::debug!(version = next_version, "applied archive migration");
        version = next_version;
    }
    Ok(())
}
