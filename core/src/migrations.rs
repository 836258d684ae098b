pub const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS mailing_lists (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      name TEXT NOT NULL UNIQUE,
      domain TEXT NOT NULL,
      display_name TEXT,
      subject_prefix TEXT,
      head_thread_id INTEGER,
      tail_thread_id INTEGER
    );

    CREATE TABLE IF NOT EXISTS senders (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      list_id INTEGER NOT NULL REFERENCES mailing_lists(id),
      address TEXT NOT NULL,
      name TEXT NOT NULL DEFAULT '',
      account_id TEXT,
      UNIQUE (list_id, address)
    );

    CREATE TABLE IF NOT EXISTS threads (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      list_id INTEGER NOT NULL REFERENCES mailing_lists(id),
      thread_id TEXT NOT NULL,
      starting_email_id INTEGER,
      date_active INTEGER NOT NULL,
      prev_thread_id INTEGER REFERENCES threads(id),
      next_thread_id INTEGER REFERENCES threads(id),
      UNIQUE (list_id, thread_id)
    );

    CREATE TABLE IF NOT EXISTS emails (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      list_id INTEGER NOT NULL REFERENCES mailing_lists(id),
      message_id TEXT NOT NULL,
      message_id_hash TEXT NOT NULL,
      sender_id INTEGER NOT NULL REFERENCES senders(id),
      subject TEXT NOT NULL DEFAULT '',
      content TEXT NOT NULL DEFAULT '',
      date INTEGER NOT NULL,
      timezone INTEGER NOT NULL DEFAULT 0,
      in_reply_to TEXT,
      parent_id INTEGER REFERENCES emails(id),
      thread_id INTEGER NOT NULL REFERENCES threads(id),
      thread_depth INTEGER NOT NULL DEFAULT 0,
      thread_order INTEGER NOT NULL DEFAULT 0,
      archived_date INTEGER NOT NULL,
      UNIQUE (list_id, message_id)
    );

    CREATE INDEX IF NOT EXISTS idx_emails_thread ON emails(thread_id, thread_order);
    CREATE INDEX IF NOT EXISTS idx_emails_sender ON emails(sender_id);
    CREATE INDEX IF NOT EXISTS idx_emails_list_hash ON emails(list_id, message_id_hash);

    CREATE TABLE IF NOT EXISTS attachments (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      email_id INTEGER NOT NULL REFERENCES emails(id) ON DELETE CASCADE,
      counter INTEGER NOT NULL,
      name TEXT NOT NULL,
      content_type TEXT NOT NULL,
      encoding TEXT,
      size INTEGER NOT NULL,
      sha256 TEXT NOT NULL,
      content BLOB NOT NULL,
      UNIQUE (email_id, counter)
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_threads_list_active
      ON threads(list_id, date_active);
    "#,
];
