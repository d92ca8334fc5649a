// Session and message database operations

use super::{current_timestamp_millis, db_error, generate_thread_id, validate_thread_id, Database, DbError};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Transaction};
use sigil_chat_types::{ChatSession, Message, Role, SamplingParameters, SessionSummary};

impl Database {
    /// Append `messages` to a session, creating it when `thread_id` is `None`
    /// or unknown. Settings and system prompt are only overwritten when given.
    /// Returns the thread id the messages were stored under.
    pub fn save_chat_messages(
        &self,
        thread_id: Option<&str>,
        messages: &[Message],
        sampling_settings: Option<&SamplingParameters>,
        system_prompt: Option<&str>,
    ) -> Result<String, DbError> {
        if let Some(id) = thread_id {
            validate_thread_id(id)?;
        }
        let settings_json = sampling_settings.map(serde_json::to_string).transpose()?;
        let now = current_timestamp_millis();

        let mut conn = self.connection();
        let tx = conn.transaction().map_err(db_error("begin transaction"))?;

        let thread_id = match thread_id {
            Some(id) => id.to_string(),
            None => {
                let mut id = generate_thread_id();
                while session_exists(&tx, &id)? {
                    id = generate_thread_id();
                }
                id
            }
        };

        if session_exists(&tx, &thread_id)? {
            tx.execute(
                "UPDATE sessions SET
                    last_updated = ?2,
                    sampling_settings = COALESCE(?3, sampling_settings),
                    system_prompt = COALESCE(?4, system_prompt)
                 WHERE thread_id = ?1",
                params![thread_id, now, settings_json, system_prompt],
            )
            .map_err(db_error("update session"))?;
        } else {
            log::info!("Creating session {thread_id}");
            tx.execute(
                "INSERT INTO sessions (thread_id, created_at, last_updated, sampling_settings, system_prompt, custom_title)
                 VALUES (?1, ?2, ?2, ?3, ?4, NULL)",
                params![thread_id, now, settings_json, system_prompt],
            )
            .map_err(db_error("create session"))?;
        }

        let next_order: i64 = tx
            .query_row(
                "SELECT COALESCE(MAX(sequence_order) + 1, 0) FROM messages WHERE thread_id = ?1",
                [&thread_id],
                |row| row.get(0),
            )
            .map_err(db_error("read message order"))?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO messages (thread_id, role, content, sequence_order)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(db_error("prepare statement"))?;
            for (offset, message) in (0_i64..).zip(messages) {
                stmt.execute(params![
                    thread_id,
                    message.role.as_str(),
                    message.content,
                    next_order + offset
                ])
                .map_err(db_error("append message"))?;
            }
        }

        tx.commit().map_err(db_error("commit session"))?;
        log::debug!("Saved {} message(s) to session {thread_id}", messages.len());
        Ok(thread_id)
    }

    /// Load a full session. `Ok(None)` when the id is unknown.
    pub fn get_session(&self, thread_id: &str) -> Result<Option<ChatSession>, DbError> {
        validate_thread_id(thread_id)?;
        let conn = self.connection();

        let row = conn
            .query_row(
                "SELECT created_at, last_updated, sampling_settings, system_prompt, custom_title
                 FROM sessions WHERE thread_id = ?1",
                [thread_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(db_error("get session"))?;

        let Some((created_at, last_updated, settings_json, system_prompt, custom_title)) = row else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare(
                "SELECT role, content FROM messages
                 WHERE thread_id = ?1 ORDER BY sequence_order ASC",
            )
            .map_err(db_error("prepare statement"))?;
        let rows = stmt
            .query_map([thread_id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(db_error("get messages"))?;

        let mut messages = Vec::new();
        for row in rows {
            let (role, content) = row.map_err(db_error("read message"))?;
            let role: Role = role.parse().map_err(|e| corrupt(thread_id, e))?;
            messages.push(Message { role, content });
        }

        let sampling_settings = settings_json
            .as_deref()
            .map(serde_json::from_str::<SamplingParameters>)
            .transpose()
            .map_err(|e| corrupt(thread_id, e))?;

        Ok(Some(ChatSession {
            thread_id: thread_id.to_string(),
            messages,
            sampling_settings,
            system_prompt,
            custom_title,
            created_at: to_datetime(thread_id, created_at)?,
            last_updated: to_datetime(thread_id, last_updated)?,
        }))
    }

    /// All sessions, most recently updated first.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, DbError> {
        let conn = self.connection();
        let mut stmt = conn
            .prepare(
                "SELECT s.thread_id, s.custom_title, s.created_at, s.last_updated,
                        (SELECT m.content FROM messages m
                         WHERE m.thread_id = s.thread_id
                         ORDER BY m.sequence_order ASC LIMIT 1)
                 FROM sessions s
                 ORDER BY s.last_updated DESC, s.created_at DESC",
            )
            .map_err(db_error("prepare statement"))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })
            .map_err(db_error("list sessions"))?;

        let mut summaries = Vec::new();
        for row in rows {
            let (thread_id, custom_title, created_at, last_updated, first_message) =
                row.map_err(db_error("read session"))?;
            let (Ok(created_at), Ok(last_updated)) = (
                to_datetime(&thread_id, created_at),
                to_datetime(&thread_id, last_updated),
            ) else {
                log::warn!("Skipping session {thread_id} with unreadable timestamps");
                continue;
            };
            summaries.push(SessionSummary {
                title: SessionSummary::title_for(&thread_id, custom_title.as_deref(), first_message.as_deref()),
                thread_id,
                created_at,
                last_updated,
            });
        }
        Ok(summaries)
    }

    /// Delete a session and its messages. `Ok(false)` when it did not exist.
    pub fn delete_session(&self, thread_id: &str) -> Result<bool, DbError> {
        validate_thread_id(thread_id)?;
        let conn = self.connection();
        let deleted = conn
            .execute("DELETE FROM sessions WHERE thread_id = ?1", [thread_id])
            .map_err(db_error("delete session"))?;
        if deleted > 0 {
            log::info!("Deleted session {thread_id}");
        }
        Ok(deleted > 0)
    }

    /// Set a custom title. `Ok(false)` when the session does not exist.
    pub fn rename_session(&self, thread_id: &str, title: &str) -> Result<bool, DbError> {
        validate_thread_id(thread_id)?;
        let conn = self.connection();
        let updated = conn
            .execute(
                "UPDATE sessions SET custom_title = ?2, last_updated = ?3 WHERE thread_id = ?1",
                params![thread_id, title, current_timestamp_millis()],
            )
            .map_err(db_error("rename session"))?;
        Ok(updated > 0)
    }
}

fn session_exists(tx: &Transaction<'_>, thread_id: &str) -> Result<bool, DbError> {
    let count: i64 = tx
        .query_row(
            "SELECT COUNT(*) FROM sessions WHERE thread_id = ?1",
            [thread_id],
            |row| row.get(0),
        )
        .map_err(db_error("check session"))?;
    Ok(count > 0)
}

fn to_datetime(thread_id: &str, millis: i64) -> Result<DateTime<Utc>, DbError> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| DbError::Corrupt {
        thread_id: thread_id.to_string(),
        detail: format!("timestamp {millis} out of range"),
    })
}

fn corrupt(thread_id: &str, err: impl std::fmt::Display) -> DbError {
    DbError::Corrupt {
        thread_id: thread_id.to_string(),
        detail: err.to_string(),
    }
}
