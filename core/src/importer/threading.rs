use rusqlite::{params, OptionalExtension, Transaction};

use crate::error::CoreError;
use crate::headers::SanitizedHeaders;
use crate::models::MailingList;

/// Where a new message goes.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Placement {
    pub thread_id: i64,
    pub parent_id: Option<i64>,
    pub depth: i64,
    pub order: i64,
    pub is_new_thread: bool,
}

/// A message joins its parent's thread when the parent candidate names a
/// message already stored in this list; otherwise (no reference, or a
/// reference into a gap of the archive) it starts a thread of its own.
pub(super) fn assign_thread(
    tx: &Transaction,
    list: &MailingList,
    headers: &SanitizedHeaders,
) -> Result<Placement, CoreError> {
    let parent = match headers.parent_candidate.as_deref() {
        Some(parent_id) if parent_id != headers.message_id => tx
            .query_row(
                "SELECT id, thread_id, thread_depth FROM emails \
                 WHERE list_id = ?1 AND message_id = ?2;",
                params![list.id, parent_id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)),
            )
            .optional()?,
        _ => None,
    };

    if let Some((parent_id, thread_id, parent_depth)) = parent {
        let order: i64 = tx.query_row(
            "SELECT COUNT(1) FROM emails WHERE thread_id = ?1;",
            params![thread_id],
            |row| row.get(0),
        )?;
        return Ok(Placement {
            thread_id,
            parent_id: Some(parent_id),
            depth: parent_depth + 1,
            order,
            is_new_thread: false,
        });
    }

    if let Some(candidate) = headers.parent_candidate.as_deref() {
        tracing::debug!(
            list = %list.name,
            message_id = %headers.message_id,
            parent = %candidate,
            "parent not archived, starting a new thread"
        );
    }
    tx.execute(
        "INSERT INTO threads (list_id, thread_id, date_active) VALUES (?1, ?2, ?3);",
        params![list.id, headers.message_id_hash, headers.date.timestamp_micros()],
    )?;
    Ok(Placement {
        thread_id: tx.last_insert_rowid(),
        parent_id: None,
        depth: 0,
        order: 0,
        is_new_thread: true,
    })
}
