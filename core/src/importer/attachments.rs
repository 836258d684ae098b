use rusqlite::{params, OptionalExtension, Transaction};
use sha2::{Digest, Sha256};

use crate::error::CoreError;
use crate::rfc822::RawAttachment;

/// Stores the attachments of `email_id`. The owning email row must already
/// exist in this same transaction; attachments are never written first.
pub(super) fn store_attachments(
    tx: &Transaction,
    email_id: i64,
    attachments: &[RawAttachment],
) -> Result<usize, CoreError> {
    if attachments.is_empty() {
        return Ok(0);
    }
    let owner: Option<i64> = tx
        .query_row("SELECT id FROM emails WHERE id = ?1;", params![email_id], |row| row.get(0))
        .optional()?;
    if owner.is_none() {
        return Err(CoreError::InvalidArgument(format!(
            "attachments for email {} written before the email",
            email_id
        )));
    }

    let mut stmt = tx.prepare(
        "INSERT INTO attachments (email_id, counter, name, content_type, encoding, size, sha256, content) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
    )?;
    for (idx, attachment) in attachments.iter().enumerate() {
        let mut hasher = Sha256::new();
        hasher.update(&attachment.content);
        let sha256 = hex::encode(hasher.finalize());
        stmt.execute(params![
            email_id,
            idx as i64,
            attachment.name,
            attachment.content_type,
            attachment.encoding,
            attachment.content.len() as i64,
            sha256,
            attachment.content,
        ])?;
    }
    tracing::debug!(email_id, count = attachments.len(), "stored attachments");
    Ok(attachments.len())
}
