// SQLite session store for Sigil Chat.
// Each chat thread is a row in `sessions` with its messages in `messages`.

pub mod schema;
pub mod sessions;

use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Failed to {context}: {source}")]
    Sqlite {
        context: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Failed to encode session settings: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid thread_id format containing path elements: '{0}'")]
    InvalidThreadId(String),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Corrupt session record {thread_id}: {detail}")]
    Corrupt { thread_id: String, detail: String },
}

/// Helper to attach context to rusqlite errors.
///
/// Usage: `.map_err(db_error("append messages"))?`
pub fn db_error(context: &'static str) -> impl Fn(rusqlite::Error) -> DbError {
    move |source| DbError::Sqlite { context, source }
}

/// Main database wrapper around a single SQLite connection
pub struct Database {
    conn: Mutex<Connection>,
}

/// Shared database type for passing across async boundaries
pub type SharedDatabase = Arc<Database>;

impl Database {
    /// Open (or create) the database at `db_path` and initialize the schema.
    /// Pass `":memory:"` for a throwaway in-memory store.
    pub fn new(db_path: &str) -> Result<Self, DbError> {
        let conn = Connection::open(db_path).map_err(db_error("open database"))?;

        conn.execute_batch("PRAGMA foreign_keys = ON")
            .map_err(db_error("enable foreign keys"))?;

        schema::initialize(&conn)?;
        log::info!("Session database ready at {db_path}");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Get the locked connection. A poisoned lock is recovered since the
    /// connection itself holds no partially-updated Rust state.
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Get current timestamp in milliseconds since Unix epoch
pub fn current_timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// New thread id from local time: `YYYYMMDD_HHMMSS_ffffff`.
pub fn generate_thread_id() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S_%6f").to_string()
}

/// Reject ids that could escape a storage directory or address nothing.
pub fn validate_thread_id(thread_id: &str) -> Result<(), DbError> {
    if thread_id.is_empty()
        || thread_id.contains("..")
        || thread_id.contains('/')
        || thread_id.contains('\\')
    {
        return Err(DbError::InvalidThreadId(thread_id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_thread_id_format() {
        let id = generate_thread_id();
        // YYYYMMDD_HHMMSS_ffffff
        assert_eq!(id.len(), 22);
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 8);
        assert_eq!(parts[1].len(), 6);
        assert_eq!(parts[2].len(), 6);
        assert!(id.chars().all(|c| c.is_ascii_digit() || c == '_'));
    }

    #[test]
    fn test_validate_thread_id() {
        assert!(validate_thread_id("20240101_101010_000001").is_ok());
        for bad in ["", "../etc", "a/b", "a\\b", ".."] {
            assert!(
                matches!(validate_thread_id(bad), Err(DbError::InvalidThreadId(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_open_in_memory() {
        let db = Database::new(":memory:").unwrap();
        let count: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
