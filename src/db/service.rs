use crate::db::models::{Message, Sender, Session};
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{params, Connection, Result as DbResult, Row};
use uuid::Uuid;

pub struct DbService;

impl DbService {
    // DuckDB returns raw timestamp values unless the chrono feature is enabled.
    // Instead of fighting the driver we query timestamps AS text in our SELECT
    // statements and parse them here.
    fn parse_timestamp(s: &str) -> DateTime<Utc> {
        s.parse::<DateTime<Utc>>()
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                    .ok()
                    .map(|n| n.and_utc())
            })
            .unwrap_or_else(Utc::now)
    }

    fn row_to_session(row: &Row) -> DbResult<Session> {
        let created_str: String = row.get(4)?;
        let updated_str: String = row.get(5)?;

        Ok(Session {
            id: row.get::<_, String>(0)?.parse().unwrap_or_default(),
            user_id: row.get(1)?,
            name: row.get(2)?,
            favorite: row.get(3)?,
            created_at: Self::parse_timestamp(&created_str),
            updated_at: Self::parse_timestamp(&updated_str),
        })
    }

    fn row_to_message(row: &Row) -> DbResult<Message> {
        let sender_str: String = row.get(2)?;
        let sender = Sender::parse(&sender_str).ok_or_else(|| {
            duckdb::Error::FromSqlConversionFailure(
                2,
                duckdb::types::Type::Text,
                format!("unknown sender '{}'", sender_str).into(),
            )
        })?;

        let context = row
            .get::<_, Option<String>>(4)?
            .and_then(|s| serde_json::from_str(&s).ok());

        let created_str: String = row.get(5)?;

        Ok(Message {
            id: row.get::<_, String>(0)?.parse().unwrap_or_default(),
            session_id: row.get::<_, String>(1)?.parse().unwrap_or_default(),
            sender,
            message: row.get(3)?,
            context,
            created_at: Self::parse_timestamp(&created_str),
        })
    }

    // --- Session Operations ---

    pub fn insert_session(conn: &Connection, user_id: &str, name: &str) -> DbResult<Session> {
        let id = Uuid::new_v4();

        conn.execute(
            "INSERT INTO chat_sessions (id, user_id, name) VALUES (?, ?, ?)",
            params![id.to_string(), user_id, name],
        )?;

        Self::get_session(conn, id)?.ok_or(duckdb::Error::QueryReturnedNoRows)
    }

    pub fn get_session(conn: &Connection, id: Uuid) -> DbResult<Option<Session>> {
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, favorite, CAST(created_at AS VARCHAR), CAST(updated_at AS VARCHAR) \
             FROM chat_sessions WHERE id = ?",
        )?;
        let mut rows = stmt.query_map(params![id.to_string()], Self::row_to_session)?;

        if let Some(row) = rows.next() {
            Ok(Some(row?))
        } else {
            Ok(None)
        }
    }

    /// Paged sessions for one user, newest first, with the total row count.
    pub fn find_sessions_by_user(
        conn: &Connection,
        user_id: &str,
        page: usize,
        size: usize,
    ) -> DbResult<(Vec<Session>, i64)> {
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chat_sessions WHERE user_id = ?",
            params![user_id],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, favorite, CAST(created_at AS VARCHAR), CAST(updated_at AS VARCHAR) \
             FROM chat_sessions WHERE user_id = ? ORDER BY created_at DESC, id LIMIT ? OFFSET ?",
        )?;
        let rows = stmt.query_map(
            params![user_id, size as i64, (page * size) as i64],
            Self::row_to_session,
        )?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok((sessions, total))
    }

    pub fn rename_session(conn: &Connection, id: Uuid, name: &str) -> DbResult<Option<Session>> {
        let updated = conn.execute(
            "UPDATE chat_sessions SET name = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![name, id.to_string()],
        )?;

        if updated == 0 {
            return Ok(None);
        }
        Self::get_session(conn, id)
    }

    pub fn set_favorite(conn: &Connection, id: Uuid, favorite: bool) -> DbResult<Option<Session>> {
        let updated = conn.execute(
            "UPDATE chat_sessions SET favorite = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![favorite, id.to_string()],
        )?;

        if updated == 0 {
            return Ok(None);
        }
        Self::get_session(conn, id)
    }

    pub fn delete_session(conn: &Connection, id: Uuid) -> DbResult<()> {
        conn.execute("BEGIN TRANSACTION", [])?;

        let id_str = id.to_string();

        // Delete messages first so the session never orphans them
        if let Err(e) = conn.execute(
            "DELETE FROM chat_messages WHERE session_id = ?",
            params![id_str],
        ) {
            let _ = conn.execute("ROLLBACK", []);
            return Err(e);
        }

        if let Err(e) = conn.execute("DELETE FROM chat_sessions WHERE id = ?", params![id_str]) {
            let _ = conn.execute("ROLLBACK", []);
            return Err(e);
        }

        conn.execute("COMMIT", [])?;
        Ok(())
    }

    // --- Message Operations ---

    pub fn insert_message(
        conn: &Connection,
        session_id: Uuid,
        sender: Sender,
        message: &str,
        context: Option<&serde_json::Value>,
    ) -> DbResult<Message> {
        let id = Uuid::new_v4();
        let context_str = context.map(|v| v.to_string());

        conn.execute(
            "INSERT INTO chat_messages (id, session_id, sender, message, context) \
             VALUES (?, ?, ?, ?, ?)",
            params![
                id.to_string(),
                session_id.to_string(),
                sender.as_str(),
                message,
                context_str
            ],
        )?;

        // Appending a message touches the parent session
        conn.execute(
            "UPDATE chat_sessions SET updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![session_id.to_string()],
        )?;

        Self::get_message(conn, id)?.ok_or(duckdb::Error::QueryReturnedNoRows)
    }

    fn get_message(conn: &Connection, id: Uuid) -> DbResult<Option<Message>> {
        let mut stmt = conn.prepare(
            "SELECT id, session_id, sender, message, context, CAST(created_at AS VARCHAR) \
             FROM chat_messages WHERE id = ?",
        )?;
        let mut rows = stmt.query_map(params![id.to_string()], Self::row_to_message)?;

        if let Some(row) = rows.next() {
            Ok(Some(row?))
        } else {
            Ok(None)
        }
    }

    /// Paged messages for a session, oldest first, with the total row count.
    pub fn list_messages(
        conn: &Connection,
        session_id: Uuid,
        page: usize,
        size: usize,
    ) -> DbResult<(Vec<Message>, i64)> {
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chat_messages WHERE session_id = ?",
            params![session_id.to_string()],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT id, session_id, sender, message, context, CAST(created_at AS VARCHAR) \
             FROM chat_messages \
             WHERE session_id = ? \
             ORDER BY created_at ASC, id \
             LIMIT ? OFFSET ?",
        )?;

        let rows = stmt.query_map(
            params![session_id.to_string(), size as i64, (page * size) as i64],
            Self::row_to_message,
        )?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok((messages, total))
    }
}
