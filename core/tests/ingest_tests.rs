use chrono::{TimeZone, Utc};
use list_archive_core::db::apply_migrations;
use list_archive_core::directory::RecordingNotifier;
use list_archive_core::query::{count_messages, get_message_by_id, list_thread_messages};
use list_archive_core::{ingest, CoreError, NoopNotifier, RawMessage, StaticDirectory};
use rusqlite::Connection;

const LIST: &str = "example-list";

fn setup_db() -> Connection {
    let conn = Connection::open_in_memory().expect("memory db");
    conn.execute_batch("PRAGMA foreign_keys = ON;").expect("pragma");
    apply_migrations(&conn).expect("migrate");
    conn
}

fn directory() -> StaticDirectory {
    StaticDirectory::new().with_list(LIST, "example.com")
}

fn dummy_message() -> RawMessage {
    RawMessage::new()
        .with_header("From", "dummy@example.com")
        .with_header("Message-ID", "<dummy>")
        .with_body("Dummy message")
}

fn email_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(1) FROM emails;", [], |row| row.get(0))
        .expect("count")
}

#[test]
fn ingest_stores_message_and_sender() {
    let mut conn = setup_db();
    let msg = dummy_message()
        .with_header("Subject", "Fake Subject")
        .with_header("Date", "Fri, 02 Nov 2012 16:07:54");
    let stored = ingest(&mut conn, &directory(), &NoopNotifier, LIST, &msg).expect("ingest");

    assert_eq!(stored.message_id, "dummy");
    assert_eq!(stored.sender_address, "dummy@example.com");
    assert_eq!(stored.subject, "Fake Subject");
    assert_eq!(stored.content, "Dummy message");
    assert_eq!(stored.thread_key, stored.message_id_hash);
    assert_eq!(stored.thread_depth, 0);
    assert_eq!(stored.thread_order, 0);

    let fetched = get_message_by_id(&conn, LIST, "<dummy>")
        .expect("query")
        .expect("found");
    assert_eq!(fetched, stored);
}

#[test]
fn missing_message_id_is_rejected() {
    let mut conn = setup_db();
    let msg = RawMessage::new().with_header("From", "dummy@example.com");
    let err = ingest(&mut conn, &directory(), &NoopNotifier, LIST, &msg).unwrap_err();
    assert!(matches!(err, CoreError::MissingMessageId));
    assert_eq!(email_count(&conn), 0);
}

#[test]
fn unknown_list_is_rejected() {
    let mut conn = setup_db();
    let err = ingest(&mut conn, &directory(), &NoopNotifier, "nope", &dummy_message()).unwrap_err();
    assert!(matches!(err, CoreError::UnknownList(name) if name == "nope"));
    assert_eq!(email_count(&conn), 0);
}

#[test]
fn missing_date_uses_ingestion_time() {
    let mut conn = setup_db();
    let before = Utc::now();
    let stored = ingest(&mut conn, &directory(), &NoopNotifier, LIST, &dummy_message()).expect("ingest");
    assert!(stored.date >= before);
    assert_eq!(stored.timezone, 0);
}

#[test]
fn naive_date_is_stored_as_utc() {
    let mut conn = setup_db();
    let msg = dummy_message().with_header("Date", "Fri, 02 Nov 2012 16:07:54");
    let stored = ingest(&mut conn, &directory(), &NoopNotifier, LIST, &msg).expect("ingest");
    let expected = Utc.with_ymd_and_hms(2012, 11, 2, 16, 7, 54).single().expect("date");
    assert_eq!(stored.date, expected);
    assert_eq!(stored.timezone, 0);
}

#[test]
fn aware_date_is_converted_and_offset_kept() {
    let mut conn = setup_db();
    let msg = dummy_message().with_header("Date", "Fri, 02 Nov 2012 16:07:54 +0100");
    let stored = ingest(&mut conn, &directory(), &NoopNotifier, LIST, &msg).expect("ingest");
    let expected = Utc.with_ymd_and_hms(2012, 11, 2, 15, 7, 54).single().expect("date");
    assert_eq!(stored.date, expected);
    assert_eq!(stored.timezone, 60);
}

#[test]
fn duplicate_is_a_silent_no_op() {
    let mut conn = setup_db();
    let notifier = RecordingNotifier::new();
    let first = ingest(&mut conn, &directory(), &notifier, LIST, &dummy_message()).expect("first");
    let second = ingest(&mut conn, &directory(), &notifier, LIST, &dummy_message()).expect("second");
    assert_eq!(first, second);
    assert_eq!(count_messages(&conn, LIST).expect("count"), 1);
    assert_eq!(list_thread_messages(&conn, first.thread_id).expect("thread").len(), 1);
    assert_eq!(notifier.message_ids(), vec!["dummy".to_string()]);
}

#[test]
fn duplicate_with_undecodable_sender_is_still_a_no_op() {
    let mut conn = setup_db();
    let mut msg = dummy_message();
    msg.set_header("From", "dummy-ascii@example.com");
    ingest(&mut conn, &directory(), &NoopNotifier, LIST, &msg).expect("first");
    msg.set_header("From", b"dummy-non-ascii\xc3\xa9@example.com");
    let again = ingest(&mut conn, &directory(), &NoopNotifier, LIST, &msg).expect("duplicate");
    assert_eq!(again.sender_address, "dummy-ascii@example.com");
    assert_eq!(count_messages(&conn, LIST).expect("count"), 1);
}

#[test]
fn non_ascii_sender_address_rolls_back_everything() {
    let mut conn = setup_db();
    let msg = RawMessage::new()
        .with_header("From", b"dummy-non-ascii-\xc3\xa9@example.com")
        .with_header("Message-ID", "<dummy>")
        .with_body("Dummy message");
    let err = ingest(&mut conn, &directory(), &NoopNotifier, LIST, &msg).unwrap_err();
    assert!(matches!(err, CoreError::InvalidAddress(_)));
    assert_eq!(email_count(&conn), 0);
    let senders: i64 = conn
        .query_row("SELECT COUNT(1) FROM senders;", [], |row| row.get(0))
        .expect("senders");
    let threads: i64 = conn
        .query_row("SELECT COUNT(1) FROM threads;", [], |row| row.get(0))
        .expect("threads");
    assert_eq!((senders, threads), (0, 0));
}

#[test]
fn long_message_id_is_truncated() {
    let mut conn = setup_db();
    let mut msg = dummy_message();
    msg.set_header("Message-ID", "X".repeat(260));
    let stored = ingest(&mut conn, &directory(), &NoopNotifier, LIST, &msg).expect("ingest");
    assert!(stored.message_id.chars().count() <= 255);
    assert_eq!(email_count(&conn), 1);
}

#[test]
fn long_subject_is_truncated() {
    let mut conn = setup_db();
    let msg = dummy_message().with_header("Subject", "x".repeat(600));
    let stored = ingest(&mut conn, &directory(), &NoopNotifier, LIST, &msg).expect("ingest");
    assert_eq!(stored.subject.chars().count(), 512);
}

#[test]
fn sender_name_is_kept() {
    let mut conn = setup_db();
    let mut msg = dummy_message();
    msg.set_header("From", "Sender Name <dummy@example.com>");
    let stored = ingest(&mut conn, &directory(), &NoopNotifier, LIST, &msg).expect("ingest");
    assert_eq!(stored.sender_name, "Sender Name");
}

#[test]
fn sender_without_address_uses_list_domain() {
    let mut conn = setup_db();
    let mut msg = dummy_message();
    msg.set_header("From", "Sender Name <>");
    let stored = ingest(&mut conn, &directory(), &NoopNotifier, LIST, &msg).expect("ingest");
    assert_eq!(stored.sender_name, "Sender Name");
    assert_eq!(stored.sender_address, "sendername@example.com");
}

#[test]
fn empty_sender_is_unknown() {
    let mut conn = setup_db();
    let mut msg = dummy_message();
    msg.set_header("From", "");
    let stored = ingest(&mut conn, &directory(), &NoopNotifier, LIST, &msg).expect("ingest");
    assert_eq!(stored.sender_name, "");
    assert_eq!(stored.sender_address, "unknown@example.com");
}

#[test]
fn same_address_reuses_identity_and_keeps_first_name() {
    let mut conn = setup_db();
    let first = RawMessage::new()
        .with_header("From", "Alice <Alice@Example.com>")
        .with_header("Message-ID", "<a1>");
    let second = RawMessage::new()
        .with_header("From", "Someone Else <alice@example.com>")
        .with_header("Message-ID", "<a2>");
    let a1 = ingest(&mut conn, &directory(), &NoopNotifier, LIST, &first).expect("a1");
    let a2 = ingest(&mut conn, &directory(), &NoopNotifier, LIST, &second).expect("a2");
    assert_eq!(a1.sender_id, a2.sender_id);
    assert_eq!(a2.sender_name, "Alice");
    assert_eq!(a2.sender_address, "alice@example.com");
}

#[test]
fn notifier_sees_only_new_messages() {
    let mut conn = setup_db();
    let notifier = RecordingNotifier::new();
    let dir = directory();
    for id in ["<n1>", "<n2>", "<n1>"] {
        let msg = dummy_message().with_header("Message-ID", id);
        ingest(&mut conn, &dir, &notifier, LIST, &msg).expect("ingest");
    }
    let bad = RawMessage::new().with_header("From", "x@example.com");
    assert!(ingest(&mut conn, &dir, &notifier, LIST, &bad).is_err());
    assert_eq!(notifier.message_ids(), vec!["n1".to_string(), "n2".to_string()]);
}

#[test]
fn derived_sender_address_is_ascii() {
    let mut conn = setup_db();
    let mut msg = dummy_message();
    msg.set_header("From", "Jos\u{e9} <>");
    let stored = ingest(&mut conn, &directory(), &NoopNotifier, LIST, &msg).expect("ingest");
    assert_eq!(stored.sender_name, "Jos\u{e9}");
    assert_eq!(stored.sender_address, "jos@example.com");
    assert!(stored.sender_address.is_ascii());

    let mut msg = dummy_message();
    msg.set_header("Message-ID", "<cjk>");
    msg.set_header("From", "\u{5f20}\u{4f1f}");
    let stored = ingest(&mut conn, &directory(), &NoopNotifier, LIST, &msg).expect("ingest");
    assert_eq!(stored.sender_address, "unknown@example.com");
}

#[test]
fn bracket_inside_message_id_does_not_collide() {
    let mut conn = setup_db();
    let dir = directory();
    let first = RawMessage::new()
        .with_header("From", "dummy@example.com")
        .with_header("Message-ID", "<a<b>");
    let second = RawMessage::new()
        .with_header("From", "dummy@example.com")
        .with_header("Message-ID", "<b>");
    let a = ingest(&mut conn, &dir, &NoopNotifier, LIST, &first).expect("first");
    let b = ingest(&mut conn, &dir, &NoopNotifier, LIST, &second).expect("second");
    assert_eq!(a.message_id, "a<b");
    assert_eq!(b.message_id, "b");
    assert_ne!(a.thread_key, b.thread_key);
    assert_eq!(count_messages(&conn, LIST).expect("count"), 2);
}
