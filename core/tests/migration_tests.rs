use list_archive_core::db::apply_migrations;
use rusqlite::Connection;

fn has_column(conn: &Connection, table: &str, column: &str) -> bool {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({});", table))
        .expect("pragma");
    let mut rows = stmt.query([]).expect("rows");
    while let Some(row) = rows.next().expect("row") {
        let name: String = row.get(1).expect("name");
        if name == column {
            return true;
        }
    }
    false
}

fn index_count(conn: &Connection, name: &str) -> i64 {
    conn.query_row(
        "SELECT COUNT(1) FROM sqlite_master WHERE type='index' AND name=?1;",
        [name],
        |row| row.get(0),
    )
    .expect("index query")
}

#[test]
fn chain_columns_exist() {
    let conn = Connection::open_in_memory().expect("memory db");
    apply_migrations(&conn).expect("migrate");
    assert!(has_column(&conn, "mailing_lists", "head_thread_id"));
    assert!(has_column(&conn, "mailing_lists", "tail_thread_id"));
    assert!(has_column(&conn, "threads", "prev_thread_id"));
    assert!(has_column(&conn, "threads", "next_thread_id"));
    assert!(has_column(&conn, "threads", "date_active"));
}

#[test]
fn email_thread_index_exists() {
    let conn = Connection::open_in_memory().expect("memory db");
    apply_migrations(&conn).expect("migrate");
    assert_eq!(index_count(&conn, "idx_emails_thread"), 1);
    assert_eq!(index_count(&conn, "idx_emails_sender"), 1);
}

#[test]
fn thread_activity_index_exists() {
    let conn = Connection::open_in_memory().expect("memory db");
    apply_migrations(&conn).expect("migrate");
    assert_eq!(index_count(&conn, "idx_threads_list_active"), 1);
}

#[test]
fn user_version_tracks_migrations() {
    let conn = Connection::open_in_memory().expect("memory db");
    apply_migrations(&conn).expect("migrate");
    apply_migrations(&conn).expect("migrate again");
    let version: i64 = conn
        .query_row("PRAGMA user_version;", [], |row| row.get(0))
        .expect("version");
    assert_eq!(version, 2);
}

#[test]
fn message_id_is_unique_per_list() {
    let conn = Connection::open_in_memory().expect("memory db");
    apply_migrations(&conn).expect("migrate");
    conn.execute_batch(
        "INSERT INTO mailing_lists (id, name, domain) VALUES (1, 'a', 'example.com'), (2, 'b', 'example.com');
         INSERT INTO senders (id, list_id, address) VALUES (1, 1, 'x@example.com'), (2, 2, 'x@example.com');
         INSERT INTO threads (id, list_id, thread_id, date_active) VALUES (1, 1, 'h', 0), (2, 2, 'h', 0);
         INSERT INTO emails (list_id, message_id, message_id_hash, sender_id, subject, content, date, timezone, thread_id, thread_depth, thread_order, archived_date)
           VALUES (1, 'm', 'h', 1, '', '', 0, 0, 1, 0, 0, 0);
         INSERT INTO emails (list_id, message_id, message_id_hash, sender_id, subject, content, date, timezone, thread_id, thread_depth, thread_order, archived_date)
           VALUES (2, 'm', 'h', 2, '', '', 0, 0, 2, 0, 0, 0);",
    )
    .expect("same id in two lists");
    let dup = conn.execute(
        "INSERT INTO emails (list_id, message_id, message_id_hash, sender_id, subject, content, date, timezone, thread_id, thread_depth, thread_order, archived_date) \
         VALUES (1, 'm', 'h', 1, '', '', 0, 0, 1, 0, 0, 0);",
        [],
    );
    assert!(dup.is_err());
}
