use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailingList {
    pub id: i64,
    pub name: String,
    pub domain: String,
    pub display_name: Option<String>,
    pub subject_prefix: Option<String>,
    /// Least recently active thread.
    pub head_thread_id: Option<i64>,
    /// Most recently active thread.
    pub tail_thread_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub list_id: i64,
    pub address: String,
    pub name: String,
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub list_id: i64,
    pub message_id: String,
    pub message_id_hash: String,
    pub sender_id: i64,
    pub sender_name: String,
    pub sender_address: String,
    pub subject: String,
    pub content: String,
    pub date: DateTime<Utc>,
    /// Offset of the original Date header from UTC, in minutes.
    pub timezone: i32,
    pub in_reply_to: Option<String>,
    pub parent_id: Option<i64>,
    /// Row id of the owning thread.
    pub thread_id: i64,
    /// Public identifier of the owning thread (hash of its root message id).
    pub thread_key: String,
    pub thread_depth: i64,
    pub thread_order: i64,
    pub archived_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: i64,
    pub list_id: i64,
    pub thread_id: String,
    pub starting_email_id: Option<i64>,
    pub date_active: DateTime<Utc>,
    pub prev_thread_id: Option<i64>,
    pub next_thread_id: Option<i64>,
    pub message_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentRow {
    pub id: i64,
    pub email_id: i64,
    pub counter: i64,
    pub name: String,
    pub content_type: String,
    pub encoding: Option<String>,
    pub size: i64,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    pub address: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveStats {
    pub lists: i64,
    pub threads: i64,
    pub messages: i64,
    pub senders: i64,
    pub attachments: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub thread: Thread,
    /// Subject of the starting message, list prefix stripped.
    pub subject: String,
    pub starting_message: Option<Message>,
    pub last_message: Option<Message>,
    pub participants: Vec<Participant>,
    pub days_old: i64,
    pub days_inactive: i64,
}
