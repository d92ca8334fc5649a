// Database schema definitions for the session store

use super::{db_error, DbError};
use rusqlite::Connection;

const CREATE_SESSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    thread_id TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL,
    last_updated INTEGER NOT NULL,
    sampling_settings TEXT,
    system_prompt TEXT,
    custom_title TEXT
)
"#;

const CREATE_MESSAGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    sequence_order INTEGER NOT NULL,
    FOREIGN KEY (thread_id) REFERENCES sessions(thread_id) ON DELETE CASCADE
)
"#;

const CREATE_MESSAGES_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_messages_thread
ON messages(thread_id, sequence_order)
"#;

/// Create tables and indexes if they don't exist
pub fn initialize(conn: &Connection) -> Result<(), DbError> {
    for sql in [CREATE_SESSIONS_TABLE, CREATE_MESSAGES_TABLE, CREATE_MESSAGES_INDEX] {
        conn.execute(sql, []).map_err(db_error("initialize schema"))?;
    }
    Ok(())
}
