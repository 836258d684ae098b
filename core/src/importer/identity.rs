use rusqlite::{params, Connection, Transaction};

use crate::address::Sender;
use crate::error::CoreError;
use crate::models::Identity;
use crate::query::{get_identity, get_list_by_name};

/// Get-or-create in two explicit steps: insert and let the unique
/// (list, address) constraint absorb a concurrent creator, then read back
/// whichever row won. A stored display name is never overwritten here.
pub(super) fn resolve_identity(
    tx: &Transaction,
    list_id: i64,
    sender: &Sender,
) -> Result<Identity, CoreError> {
    let inserted = tx.execute(
        "INSERT INTO senders (list_id, address, name) VALUES (?1, ?2, ?3) \
         ON CONFLICT(list_id, address) DO NOTHING;",
        params![list_id, sender.address, sender.name],
    )?;
    if inserted > 0 {
        tracing::debug!(list_id, address = %sender.address, "created sender identity");
    }
    get_identity(tx, list_id, &sender.address)?.ok_or_else(|| {
        CoreError::InvalidArgument(format!("sender {} vanished after insert", sender.address))
    })
}

/// Explicit profile-level rename; plain ingestion never changes the name.
pub fn update_identity_name(
    conn: &Connection,
    list_name: &str,
    address: &str,
    name: &str,
) -> Result<Identity, CoreError> {
    let list = get_list_by_name(conn, list_name)?
        .ok_or_else(|| CoreError::UnknownList(list_name.to_string()))?;
    let address = address.trim().to_lowercase();
    let changed = conn.execute(
        "UPDATE senders SET name = ?3 WHERE list_id = ?1 AND address = ?2;",
        params![list.id, address, name.trim()],
    )?;
    if changed == 0 {
        return Err(CoreError::InvalidArgument(format!("no sender {} in {}", address, list_name)));
    }
    get_identity(conn, list.id, &address)?
        .ok_or_else(|| CoreError::InvalidArgument(format!("no sender {} in {}", address, list_name)))
}

/// Links a sender to an external account, or unlinks it with `None`.
pub fn link_identity_account(
    conn: &Connection,
    list_name: &str,
    address: &str,
    account_id: Option<&str>,
) -> Result<Identity, CoreError> {
    let list = get_list_by_name(conn, list_name)?
        .ok_or_else(|| CoreError::UnknownList(list_name.to_string()))?;
    let address = address.trim().to_lowercase();
    conn.execute(
        "UPDATE senders SET account_id = ?3 WHERE list_id = ?1 AND address = ?2;",
        params![list.id, address, account_id],
    )?;
    get_identity(conn, list.id, &address)?
        .ok_or_else(|| CoreError::InvalidArgument(format!("no sender {} in {}", address, list_name)))
}
