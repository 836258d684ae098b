//! Per-list activity chain.
//!
//! Threads of a list form a doubly-linked list through
//! `threads.prev_thread_id` / `threads.next_thread_id`, ordered by
//! `date_active`: the list row's `head_thread_id` is the least recently
//! active thread, `tail_thread_id` the most recent. Every change rewrites both
//! ends of each touched link inside the ingestion transaction.

use chrono::{DateTime, Utc};
use rusqlite::{params, Transaction};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy)]
struct ChainNode {
    id: i64,
    prev: Option<i64>,
    next: Option<i64>,
    date_active: i64,
}

fn load_node(tx: &Transaction, id: i64) -> Result<ChainNode, CoreError> {
    tx.query_row(
        "SELECT id, prev_thread_id, next_thread_id, date_active FROM threads WHERE id = ?1;",
        params![id],
        |row| {
            Ok(ChainNode {
                id: row.get(0)?,
                prev: row.get(1)?,
                next: row.get(2)?,
                date_active: row.get(3)?,
            })
        },
    )
    .map_err(CoreError::from)
}

fn list_ends(tx: &Transaction, list_id: i64) -> Result<(Option<i64>, Option<i64>), CoreError> {
    tx.query_row(
        "SELECT head_thread_id, tail_thread_id FROM mailing_lists WHERE id = ?1;",
        params![list_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .map_err(CoreError::from)
}

fn set_head(tx: &Transaction, list_id: i64, head: Option<i64>) -> Result<(), CoreError> {
    tx.execute(
        "UPDATE mailing_lists SET head_thread_id = ?2 WHERE id = ?1;",
        params![list_id, head],
    )?;
    Ok(())
}

fn set_tail(tx: &Transaction, list_id: i64, tail: Option<i64>) -> Result<(), CoreError> {
    tx.execute(
        "UPDATE mailing_lists SET tail_thread_id = ?2 WHERE id = ?1;",
        params![list_id, tail],
    )?;
    Ok(())
}

fn set_prev(tx: &Transaction, id: i64, prev: Option<i64>) -> Result<(), CoreError> {
    tx.execute(
        "UPDATE threads SET prev_thread_id = ?2 WHERE id = ?1;",
        params![id, prev],
    )?;
    Ok(())
}

fn set_next(tx: &Transaction, id: i64, next: Option<i64>) -> Result<(), CoreError> {
    tx.execute(
        "UPDATE threads SET next_thread_id = ?2 WHERE id = ?1;",
        params![id, next],
    )?;
    Ok(())
}

/// Links a freshly created (unlinked) thread at its activity position.
pub(super) fn link_new_thread(
    tx: &Transaction,
    list_id: i64,
    thread_id: i64,
    active: DateTime<Utc>,
) -> Result<(), CoreError> {
    insert_by_activity(tx, list_id, thread_id, active.timestamp_micros())
}

/// Records a new message on an already linked thread. The thread only moves
/// when the message is newer than its recorded activity and overtakes its
/// successor; the move is an unlink followed by a relink further toward the
/// tail.
pub(super) fn record_activity(
    tx: &Transaction,
    list_id: i64,
    thread_id: i64,
    date: DateTime<Utc>,
) -> Result<(), CoreError> {
    let node = load_node(tx, thread_id)?;
    let date = date.timestamp_micros();
    if date <= node.date_active {
        return Ok(());
    }
    tx.execute(
        "UPDATE threads SET date_active = ?2 WHERE id = ?1;",
        params![thread_id, date],
    )?;

    let overtakes_next = match node.next {
        Some(next) => load_node(tx, next)?.date_active <= date,
        None => false,
    };
    if !overtakes_next {
        return Ok(());
    }
    unlink(tx, list_id, &node)?;
    insert_by_activity(tx, list_id, thread_id, date)
}

fn unlink(tx: &Transaction, list_id: i64, node: &ChainNode) -> Result<(), CoreError> {
    match node.prev {
        Some(prev) => set_next(tx, prev, node.next)?,
        None => set_head(tx, list_id, node.next)?,
    }
    match node.next {
        Some(next) => set_prev(tx, next, node.prev)?,
        None => set_tail(tx, list_id, node.prev)?,
    }
    set_prev(tx, node.id, None)?;
    set_next(tx, node.id, None)
}

/// Walks back from the tail to the last thread not newer than `active` and
/// links after it. Live traffic carries the newest date, so the walk stops
/// at the tail right away; only back-dated messages walk further.
fn insert_by_activity(
    tx: &Transaction,
    list_id: i64,
    thread_id: i64,
    active: i64,
) -> Result<(), CoreError> {
    let (_, tail) = list_ends(tx, list_id)?;
    let total: i64 = tx.query_row(
        "SELECT COUNT(1) FROM threads WHERE list_id = ?1;",
        params![list_id],
        |row| row.get(0),
    )?;

    let mut after = tail;
    let mut steps: i64 = 0;
    while let Some(candidate) = after {
        let node = load_node(tx, candidate)?;
        if node.date_active <= active {
            break;
        }
        steps += 1;
        if steps > total {
            return Err(CoreError::CorruptChain {
                list: list_id.to_string(),
                reason: format!("cycle while placing thread {}", thread_id),
            });
        }
        after = node.prev;
    }
    link_after(tx, list_id, thread_id, after)
}

fn link_after(
    tx: &Transaction,
    list_id: i64,
    thread_id: i64,
    after: Option<i64>,
) -> Result<(), CoreError> {
    match after {
        Some(anchor) => {
            let anchor_next = load_node(tx, anchor)?.next;
            set_prev(tx, thread_id, Some(anchor))?;
            set_next(tx, thread_id, anchor_next)?;
            set_next(tx, anchor, Some(thread_id))?;
            match anchor_next {
                Some(next) => set_prev(tx, next, Some(thread_id)),
                None => set_tail(tx, list_id, Some(thread_id)),
            }
        }
        None => {
            let (head, _) = list_ends(tx, list_id)?;
            set_prev(tx, thread_id, None)?;
            set_next(tx, thread_id, head)?;
            match head {
                Some(old_head) => set_prev(tx, old_head, Some(thread_id))?,
                None => set_tail(tx, list_id, Some(thread_id))?,
            }
            set_head(tx, list_id, Some(thread_id))
        }
    }
}
