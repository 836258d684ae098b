use std::collections::{HashMap, HashSet};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::CoreError;
use crate::headers::sanitize_message_id;
use crate::models::{
    ArchiveStats, AttachmentRow, Identity, MailingList, Message, Participant, Thread,
    ThreadSummary,
};

const MESSAGE_SELECT: &str = "SELECT e.id, e.list_id, e.message_id, e.message_id_hash, e.sender_id, \
            s.name, s.address, e.subject, e.content, e.date, e.timezone, e.in_reply_to, \
            e.parent_id, e.thread_id, t.thread_id, e.thread_depth, e.thread_order, e.archived_date \
     FROM emails e \
     JOIN senders s ON s.id = e.sender_id \
     JOIN threads t ON t.id = e.thread_id";

const THREAD_SELECT: &str = "SELECT t.id, t.list_id, t.thread_id, t.starting_email_id, t.date_active, \
            t.prev_thread_id, t.next_thread_id, \
            (SELECT COUNT(1) FROM emails e WHERE e.thread_id = t.id) AS message_count \
     FROM threads t";

/// Reads a stored microsecond timestamp; a value chrono cannot represent is
/// a corrupt row, not a date.
fn micros_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(idx)?;
    Utc.timestamp_micros(micros)
        .single()
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, micros))
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        list_id: row.get(1)?,
        message_id: row.get(2)?,
        message_id_hash: row.get(3)?,
        sender_id: row.get(4)?,
        sender_name: row.get(5)?,
        sender_address: row.get(6)?,
        subject: row.get(7)?,
        content: row.get(8)?,
        date: micros_at(row, 9)?,
        timezone: row.get(10)?,
        in_reply_to: row.get(11)?,
        parent_id: row.get(12)?,
        thread_id: row.get(13)?,
        thread_key: row.get(14)?,
        thread_depth: row.get(15)?,
        thread_order: row.get(16)?,
        archived_date: micros_at(row, 17)?,
    })
}

fn thread_from_row(row: &Row<'_>) -> rusqlite::Result<Thread> {
    Ok(Thread {
        id: row.get(0)?,
        list_id: row.get(1)?,
        thread_id: row.get(2)?,
        starting_email_id: row.get(3)?,
        date_active: micros_at(row, 4)?,
        prev_thread_id: row.get(5)?,
        next_thread_id: row.get(6)?,
        message_count: row.get(7)?,
    })
}

pub fn get_list_by_name(conn: &Connection, name: &str) -> Result<Option<MailingList>, CoreError> {
    conn.query_row(
        "SELECT id, name, domain, display_name, subject_prefix, head_thread_id, tail_thread_id \
         FROM mailing_lists WHERE name = ?1;",
        params![name],
        |row| {
            Ok(MailingList {
                id: row.get(0)?,
                name: row.get(1)?,
                domain: row.get(2)?,
                display_name: row.get(3)?,
                subject_prefix: row.get(4)?,
                head_thread_id: row.get(5)?,
                tail_thread_id: row.get(6)?,
            })
        },
    )
    .optional()
    .map_err(CoreError::from)
}

fn require_list(conn: &Connection, name: &str) -> Result<MailingList, CoreError> {
    get_list_by_name(conn, name)?.ok_or_else(|| CoreError::UnknownList(name.to_string()))
}

pub fn get_message(conn: &Connection, id: i64) -> Result<Message, CoreError> {
    conn.query_row(
        &format!("{} WHERE e.id = ?1;", MESSAGE_SELECT),
        params![id],
        message_from_row,
    )
    .map_err(CoreError::from)
}

/// Looks up by the stored (already sanitized) identifier.
pub fn find_message(
    conn: &Connection,
    list_id: i64,
    message_id: &str,
) -> Result<Option<Message>, CoreError> {
    conn.query_row(
        &format!("{} WHERE e.list_id = ?1 AND e.message_id = ?2;", MESSAGE_SELECT),
        params![list_id, message_id],
        message_from_row,
    )
    .optional()
    .map_err(CoreError::from)
}

/// Looks up by a Message-ID as it appears in a header; brackets and
/// over-long identifiers are handled the way ingestion handles them.
pub fn get_message_by_id(
    conn: &Connection,
    list_name: &str,
    message_id: &str,
) -> Result<Option<Message>, CoreError> {
    let list = require_list(conn, list_name)?;
    match sanitize_message_id(message_id) {
        Some(id) => find_message(conn, list.id, &id),
        None => Ok(None),
    }
}

pub fn count_messages(conn: &Connection, list_name: &str) -> Result<i64, CoreError> {
    let count = conn.query_row(
        "SELECT COUNT(1) FROM emails e JOIN mailing_lists l ON l.id = e.list_id WHERE l.name = ?1;",
        params![list_name],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Messages of a thread in arrival order.
pub fn list_thread_messages(conn: &Connection, thread_id: i64) -> Result<Vec<Message>, CoreError> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE e.thread_id = ?1 ORDER BY e.thread_order ASC, e.id ASC;",
        MESSAGE_SELECT
    ))?;
    let rows = stmt.query_map(params![thread_id], message_from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(CoreError::from)
}

/// Messages of a thread in reply-tree order: each message is followed by
/// its replies (depth first), siblings in arrival order.
pub fn list_thread_messages_by_reply(
    conn: &Connection,
    thread_id: i64,
) -> Result<Vec<Message>, CoreError> {
    Ok(reply_order(list_thread_messages(conn, thread_id)?))
}

fn reply_order(messages: Vec<Message>) -> Vec<Message> {
    let ids: HashSet<i64> = messages.iter().map(|m| m.id).collect();
    let mut children: HashMap<Option<i64>, Vec<usize>> = HashMap::new();
    for (idx, message) in messages.iter().enumerate() {
        let parent = message.parent_id.filter(|id| ids.contains(id));
        children.entry(parent).or_default().push(idx);
    }

    let mut order = Vec::with_capacity(messages.len());
    let mut stack: Vec<usize> = children
        .get(&None)
        .map(|roots| roots.iter().rev().copied().collect())
        .unwrap_or_default();
    while let Some(idx) = stack.pop() {
        order.push(idx);
        if let Some(replies) = children.get(&Some(messages[idx].id)) {
            stack.extend(replies.iter().rev().copied());
        }
    }

    let mut slots: Vec<Option<Message>> = messages.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|idx| slots.get_mut(idx).and_then(Option::take))
        .collect()
}

/// Most recent message of a thread by date.
pub fn thread_last_message(conn: &Connection, thread_id: i64) -> Result<Option<Message>, CoreError> {
    conn.query_row(
        &format!(
            "{} WHERE e.thread_id = ?1 ORDER BY e.date DESC, e.id DESC LIMIT 1;",
            MESSAGE_SELECT
        ),
        params![thread_id],
        message_from_row,
    )
    .optional()
    .map_err(CoreError::from)
}

/// Everyone who posted in a thread, in order of their first message there.
pub fn thread_participants(conn: &Connection, thread_id: i64) -> Result<Vec<Participant>, CoreError> {
    let mut stmt = conn.prepare(
        "SELECT s.name, s.address, COUNT(e.id) AS post_count, MIN(e.id) AS first_post \
         FROM emails e \
         JOIN senders s ON s.id = e.sender_id \
         WHERE e.thread_id = ?1 \
         GROUP BY s.id \
         ORDER BY first_post ASC;",
    )?;
    let rows = stmt.query_map(params![thread_id], |row| {
        Ok(Participant {
            name: row.get(0)?,
            address: row.get(1)?,
            count: row.get(2)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(CoreError::from)
}

/// Subject without the list's configured prefix (e.g. `[devel]`), matched
/// case-insensitively at the start.
pub fn stripped_subject(list: &MailingList, subject: &str) -> String {
    let prefix = match list.subject_prefix.as_deref().map(str::trim) {
        Some(prefix) if !prefix.is_empty() => prefix,
        _ => return subject.to_string(),
    };
    match strip_prefix_ignore_case(subject.trim_start(), prefix) {
        Some(rest) => rest.trim_start().to_string(),
        None => subject.to_string(),
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let mut chars = s.char_indices();
    for expected in prefix.chars() {
        let (_, c) = chars.next()?;
        if !c.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    let end = chars.next().map(|(idx, _)| idx).unwrap_or(s.len());
    Some(&s[end..])
}

/// Everything a thread page shows about a thread, with ages counted in
/// whole days up to `today`.
pub fn thread_summary(
    conn: &Connection,
    list_name: &str,
    thread_id: &str,
    today: DateTime<Utc>,
) -> Result<Option<ThreadSummary>, CoreError> {
    let list = require_list(conn, list_name)?;
    let thread = match get_thread(conn, list_name, thread_id)? {
        Some(thread) => thread,
        None => return Ok(None),
    };
    let starting_message = thread
        .starting_email_id
        .map(|id| get_message(conn, id))
        .transpose()?;
    let last_message = thread_last_message(conn, thread.id)?;
    let participants = thread_participants(conn, thread.id)?;
    let days_since = |message: &Option<Message>| {
        message
            .as_ref()
            .map(|m| (today.date_naive() - m.date.date_naive()).num_days())
            .unwrap_or(0)
    };

    Ok(Some(ThreadSummary {
        subject: starting_message
            .as_ref()
            .map(|m| stripped_subject(&list, &m.subject))
            .unwrap_or_default(),
        days_old: days_since(&starting_message),
        days_inactive: days_since(&last_message),
        thread,
        starting_message,
        last_message,
        participants,
    }))
}

pub fn get_thread_by_row_id(conn: &Connection, id: i64) -> Result<Thread, CoreError> {
    conn.query_row(
        &format!("{} WHERE t.id = ?1;", THREAD_SELECT),
        params![id],
        thread_from_row,
    )
    .map_err(CoreError::from)
}

pub fn get_thread(
    conn: &Connection,
    list_name: &str,
    thread_id: &str,
) -> Result<Option<Thread>, CoreError> {
    let list = require_list(conn, list_name)?;
    conn.query_row(
        &format!("{} WHERE t.list_id = ?1 AND t.thread_id = ?2;", THREAD_SELECT),
        params![list.id, thread_id],
        thread_from_row,
    )
    .optional()
    .map_err(CoreError::from)
}

/// The threads right before (less recently active) and right after (more
/// recently active) the given one.
pub fn get_thread_neighbors(
    conn: &Connection,
    list_name: &str,
    thread_id: &str,
) -> Result<(Option<Thread>, Option<Thread>), CoreError> {
    let thread = match get_thread(conn, list_name, thread_id)? {
        Some(thread) => thread,
        None => return Ok((None, None)),
    };
    let prev = thread
        .prev_thread_id
        .map(|id| get_thread_by_row_id(conn, id))
        .transpose()?;
    let next = thread
        .next_thread_id
        .map(|id| get_thread_by_row_id(conn, id))
        .transpose()?;
    Ok((prev, next))
}

/// Walks the activity chain from head (least recent) to tail (most recent),
/// checking back links, termination and coverage of every thread in the list.
pub fn thread_chain(conn: &Connection, list_name: &str) -> Result<Vec<Thread>, CoreError> {
    let list = require_list(conn, list_name)?;
    let total: i64 = conn.query_row(
        "SELECT COUNT(1) FROM threads WHERE list_id = ?1;",
        params![list.id],
        |row| row.get(0),
    )?;
    let corrupt = |reason: String| CoreError::CorruptChain {
        list: list_name.to_string(),
        reason,
    };

    let mut chain: Vec<Thread> = Vec::with_capacity(total as usize);
    let mut cursor = list.head_thread_id;
    let mut expected_prev: Option<i64> = None;
    while let Some(id) = cursor {
        if chain.len() as i64 >= total {
            return Err(corrupt(format!("cycle detected at thread {}", id)));
        }
        let thread = get_thread_by_row_id(conn, id)?;
        if thread.list_id != list.id {
            return Err(corrupt(format!("thread {} belongs to another list", id)));
        }
        if thread.prev_thread_id != expected_prev {
            return Err(corrupt(format!("thread {} has a stale prev link", id)));
        }
        expected_prev = Some(thread.id);
        cursor = thread.next_thread_id;
        chain.push(thread);
    }
    if list.tail_thread_id != expected_prev {
        return Err(corrupt("tail does not match the last linked thread".to_string()));
    }
    if chain.len() as i64 != total {
        return Err(corrupt(format!(
            "{} of {} threads reachable from head",
            chain.len(),
            total
        )));
    }
    Ok(chain)
}

/// Senders ranked by message count; equal counts keep the order in which the
/// senders first posted.
pub fn top_posters(
    conn: &Connection,
    list_name: &str,
    limit: i64,
) -> Result<Vec<Participant>, CoreError> {
    let mut stmt = conn.prepare(
        "SELECT s.name, s.address, COUNT(e.id) AS post_count, MIN(e.id) AS first_post \
         FROM emails e \
         JOIN senders s ON s.id = e.sender_id \
         JOIN mailing_lists l ON l.id = e.list_id \
         WHERE l.name = ?1 \
         GROUP BY s.id \
         ORDER BY post_count DESC, first_post ASC \
         LIMIT ?2;",
    )?;
    let rows = stmt.query_map(params![list_name, limit], |row| {
        Ok(Participant {
            name: row.get(0)?,
            address: row.get(1)?,
            count: row.get(2)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(CoreError::from)
}

pub fn get_identity(
    conn: &Connection,
    list_id: i64,
    address: &str,
) -> Result<Option<Identity>, CoreError> {
    conn.query_row(
        "SELECT id, list_id, address, name, account_id FROM senders \
         WHERE list_id = ?1 AND address = ?2;",
        params![list_id, address.to_lowercase()],
        |row| {
            Ok(Identity {
                id: row.get(0)?,
                list_id: row.get(1)?,
                address: row.get(2)?,
                name: row.get(3)?,
                account_id: row.get(4)?,
            })
        },
    )
    .optional()
    .map_err(CoreError::from)
}

/// Posts in one list from every sender linked to `account_id`, newest first.
pub fn messages_by_account(
    conn: &Connection,
    list_name: &str,
    account_id: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<Message>, CoreError> {
    let list = require_list(conn, list_name)?;
    let mut stmt = conn.prepare(&format!(
        "{} WHERE e.list_id = ?1 AND s.account_id = ?2 \
         ORDER BY e.date DESC, e.id DESC LIMIT ?3 OFFSET ?4;",
        MESSAGE_SELECT
    ))?;
    let rows = stmt.query_map(params![list.id, account_id, limit, offset], message_from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(CoreError::from)
}

/// Post count for an account, in one list or across all of them.
pub fn count_messages_by_account(
    conn: &Connection,
    account_id: &str,
    list_name: Option<&str>,
) -> Result<i64, CoreError> {
    let count = match list_name {
        Some(name) => {
            let list = require_list(conn, name)?;
            conn.query_row(
                "SELECT COUNT(1) FROM emails e JOIN senders s ON s.id = e.sender_id \
                 WHERE s.account_id = ?1 AND e.list_id = ?2;",
                params![account_id, list.id],
                |row| row.get(0),
            )?
        }
        None => conn.query_row(
            "SELECT COUNT(1) FROM emails e JOIN senders s ON s.id = e.sender_id \
             WHERE s.account_id = ?1;",
            params![account_id],
            |row| row.get(0),
        )?,
    };
    Ok(count)
}

/// First non-empty sender name linked to the account.
pub fn account_display_name(conn: &Connection, account_id: &str) -> Result<Option<String>, CoreError> {
    conn.query_row(
        "SELECT name FROM senders WHERE account_id = ?1 AND name != '' ORDER BY id ASC LIMIT 1;",
        params![account_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(CoreError::from)
}

pub fn list_attachments_for_message(
    conn: &Connection,
    email_id: i64,
) -> Result<Vec<AttachmentRow>, CoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, email_id, counter, name, content_type, encoding, size, sha256 \
         FROM attachments WHERE email_id = ?1 ORDER BY counter ASC;",
    )?;
    let rows = stmt.query_map(params![email_id], |row| {
        Ok(AttachmentRow {
            id: row.get(0)?,
            email_id: row.get(1)?,
            counter: row.get(2)?,
            name: row.get(3)?,
            content_type: row.get(4)?,
            encoding: row.get(5)?,
            size: row.get(6)?,
            sha256: row.get(7)?,
        })
    })?;
    Ok(rows.filter_map(Result::ok).collect())
}

pub fn get_attachment_content(conn: &Connection, attachment_id: i64) -> Result<Vec<u8>, CoreError> {
    conn.query_row(
        "SELECT content FROM attachments WHERE id = ?1;",
        params![attachment_id],
        |row| row.get(0),
    )
    .map_err(CoreError::from)
}

pub fn archive_stats(conn: &Connection) -> Result<ArchiveStats, CoreError> {
    let lists: i64 = conn.query_row("SELECT COUNT(1) FROM mailing_lists;", [], |row| row.get(0))?;
    let threads: i64 = conn.query_row("SELECT COUNT(1) FROM threads;", [], |row| row.get(0))?;
    let messages: i64 = conn.query_row("SELECT COUNT(1) FROM emails;", [], |row| row.get(0))?;
    let senders: i64 = conn.query_row("SELECT COUNT(1) FROM senders;", [], |row| row.get(0))?;
    let attachments: i64 = conn.query_row("SELECT COUNT(1) FROM attachments;", [], |row| row.get(0))?;
    Ok(ArchiveStats {
        lists,
        threads,
        messages,
        senders,
        attachments,
    })
}
