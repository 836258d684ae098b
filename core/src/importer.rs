use std::thread;
use std::time::Duration;

use rusqlite::{params, Connection, Transaction, TransactionBehavior};

use crate::address::normalize_sender;
use crate::config::IngestConfig;
use crate::directory::{IndexNotifier, ListDirectory, ListInfo};
use crate::error::CoreError;
use crate::headers::{extract_message_id, ingestion_time, sanitize_headers};
use crate::models::{MailingList, Message};
use crate::query::{find_message, get_list_by_name, get_message};
use crate::rfc822::RawMessage;

#[path = "importer/attachments.rs"]
mod attachments;
#[path = "importer/identity.rs"]
mod identity;
#[path = "importer/reorder.rs"]
mod reorder;
#[path = "importer/threading.rs"]
mod threading;

pub use identity::{link_identity_account, update_identity_name};

const RETRY_BACKOFF_MS: u64 = 20;

/// Outcome of one ingestion attempt.
#[derive(Debug)]
enum Ingested {
    Created(Message),
    Duplicate(Message),
}

pub struct Ingestor<'a> {
    directory: &'a dyn ListDirectory,
    notifier: &'a dyn IndexNotifier,
    max_retries: u32,
}

impl<'a> Ingestor<'a> {
    pub fn new(directory: &'a dyn ListDirectory, notifier: &'a dyn IndexNotifier) -> Self {
        Self {
            directory,
            notifier,
            max_retries: IngestConfig::default().max_retries,
        }
    }

    pub fn with_config(mut self, config: &IngestConfig) -> Self {
        self.max_retries = config.max_retries;
        self
    }

    /// Archives one message into `list_name` and returns the stored row.
    ///
    /// The whole pipeline runs in a single immediate transaction: either the
    /// message, its sender, thread placement and attachments are all
    /// committed, or nothing is. A message whose (list, Message-ID) is already
    /// stored is returned as is, without touching threads or notifying the
    /// indexer.
    pub fn ingest(
        &self,
        conn: &mut Connection,
        list_name: &str,
        raw: &RawMessage,
    ) -> Result<Message, CoreError> {
        let list = self
            .directory
            .get_list(list_name)
            .ok_or_else(|| CoreError::UnknownList(list_name.to_string()))?;
        let message_id = extract_message_id(raw)?;

        let mut attempt: u32 = 0;
        loop {
            match ingest_once(conn, &list, raw) {
                Ok(Ingested::Created(message)) => {
                    tracing::info!(
                        list = %list.name,
                        message_id = %message.message_id,
                        thread = %message.thread_key,
                        depth = message.thread_depth,
                        "archived message"
                    );
                    self.notifier.on_new_message(&message);
                    return Ok(message);
                }
                Ok(Ingested::Duplicate(message)) => {
                    tracing::debug!(list = %list.name, message_id = %message_id, "duplicate message ignored");
                    return Ok(message);
                }
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        list = %list.name,
                        message_id = %message_id,
                        attempt,
                        error = %err,
                        "transient conflict, retrying ingestion"
                    );
                    thread::sleep(Duration::from_millis(RETRY_BACKOFF_MS * u64::from(attempt)));
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Convenience wrapper around [`Ingestor::ingest`] with default settings.
pub fn ingest(
    conn: &mut Connection,
    directory: &dyn ListDirectory,
    notifier: &dyn IndexNotifier,
    list_name: &str,
    raw: &RawMessage,
) -> Result<Message, CoreError> {
    Ingestor::new(directory, notifier).ingest(conn, list_name, raw)
}

fn ingest_once(
    conn: &mut Connection,
    list: &ListInfo,
    raw: &RawMessage,
) -> Result<Ingested, CoreError> {
    let headers = sanitize_headers(raw)?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mlist = ensure_list(&tx, list)?;

    // Dropping `tx` rolls back; nothing was written yet anyway.
    if let Some(existing) = find_message(&tx, mlist.id, &headers.message_id)? {
        return Ok(Ingested::Duplicate(existing));
    }

    let sender = normalize_sender(raw.header("From"), &mlist.domain)?;
    let identity = identity::resolve_identity(&tx, mlist.id, &sender)?;
    let placement = threading::assign_thread(&tx, &mlist, &headers)?;

    tx.execute(
        "INSERT INTO emails (list_id, message_id, message_id_hash, sender_id, subject, content, \
                             date, timezone, in_reply_to, parent_id, thread_id, thread_depth, \
                             thread_order, archived_date) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14);",
        params![
            mlist.id,
            headers.message_id,
            headers.message_id_hash,
            identity.id,
            headers.subject,
            raw.body,
            headers.date.timestamp_micros(),
            headers.timezone,
            headers.parent_candidate,
            placement.parent_id,
            placement.thread_id,
            placement.depth,
            placement.order,
            ingestion_time().timestamp_micros(),
        ],
    )?;
    let email_id = tx.last_insert_rowid();

    if placement.is_new_thread {
        tx.execute(
            "UPDATE threads SET starting_email_id = ?2 WHERE id = ?1;",
            params![placement.thread_id, email_id],
        )?;
        reorder::link_new_thread(&tx, mlist.id, placement.thread_id, headers.date)?;
    } else {
        reorder::record_activity(&tx, mlist.id, placement.thread_id, headers.date)?;
    }

    attachments::store_attachments(&tx, email_id, &raw.attachments)?;

    let message = get_message(&tx, email_id)?;
    tx.commit()?;
    Ok(Ingested::Created(message))
}

/// Mirrors the directory entry into the archive, creating the list row on
/// first use. Chain head/tail are left alone.
fn ensure_list(tx: &Transaction, list: &ListInfo) -> Result<MailingList, CoreError> {
    tx.execute(
        "INSERT INTO mailing_lists (name, domain, display_name, subject_prefix) \
         VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT(name) DO UPDATE SET \
           domain = excluded.domain, \
           display_name = excluded.display_name, \
           subject_prefix = excluded.subject_prefix;",
        params![list.name, list.domain, list.display_name, list.subject_prefix],
    )?;
    get_list_by_name(tx, &list.name)?.ok_or_else(|| CoreError::UnknownList(list.name.clone()))
}
