use crate::memory_db::schema::*;
use rusqlite::{params, Row};
use chrono::{DateTime, Utc, NaiveDateTime};
use uuid::Uuid;
use tracing::{info, debug, warn};
use std::sync::Arc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

/// Parameters for appending a message to a conversation.
pub struct MessageParams<'a> {
    pub conversation_id: &'a str,
    pub role: &'a str,
    pub content: &'a str,
    pub message_index: i32,
    pub tokens: i32,
}

/// Sessions, conversations, and their append-only message logs.
pub struct ConversationStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl ConversationStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    pub fn create_session(&self) -> anyhow::Result<Session> {
        let session_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO sessions (id, created_at, last_accessed) VALUES (?1, ?2, ?3)",
            params![&session_id, now.to_rfc3339(), now.to_rfc3339()],
        )?;

        info!("Created session {}", session_id);
        Ok(Session { id: session_id, created_at: now, last_accessed: now })
    }

    pub fn get_session(&self, session_id: &str) -> anyhow::Result<Option<Session>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, created_at, last_accessed FROM sessions WHERE id = ?1"
        )?;
        let mut rows = stmt.query([session_id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(self.row_to_session(row)?))
        } else {
            Ok(None)
        }
    }

    /// Return the existing session, or mint a fresh one when the id is
    /// absent or unknown (a stale id from a cleared browser profile).
    pub fn get_or_create_session(&self, session_id: Option<&str>) -> anyhow::Result<Session> {
        if let Some(id) = session_id {
            if let Some(session) = self.get_session(id)? {
                self.touch_session(id)?;
                return Ok(session);
            }
            debug!("Unknown session id {}, creating a new session", id);
        }
        self.create_session()
    }

    pub fn touch_session(&self, session_id: &str) -> anyhow::Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE sessions SET last_accessed = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), session_id],
        )?;
        Ok(())
    }

    pub fn create_conversation(
        &self,
        session_id: &str,
        bot_name: &str,
        persona: &str,
        model: &str,
    ) -> anyhow::Result<Conversation> {
        let conversation_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO conversations (id, session_id, bot_name, persona, model, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![&conversation_id, session_id, bot_name, persona, model,
                    now.to_rfc3339(), now.to_rfc3339()],
        )?;

        info!("Created conversation {} in session {}", conversation_id, session_id);
        Ok(Conversation {
            id: conversation_id,
            session_id: session_id.to_string(),
            bot_name: bot_name.to_string(),
            persona: persona.to_string(),
            model: model.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_conversation(&self, conversation_id: &str) -> anyhow::Result<Option<Conversation>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, bot_name, persona, model, created_at, updated_at
             FROM conversations WHERE id = ?1"
        )?;
        let mut rows = stmt.query([conversation_id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(self.row_to_conversation(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn get_session_conversations(&self, session_id: &str) -> anyhow::Result<Vec<Conversation>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, bot_name, persona, model, created_at, updated_at
             FROM conversations WHERE session_id = ?1 ORDER BY updated_at DESC"
        )?;
        let mut rows = stmt.query([session_id])?;
        let mut conversations = Vec::new();

        while let Some(row) = rows.next()? {
            conversations.push(self.row_to_conversation(row)?);
        }

        Ok(conversations)
    }

    pub fn touch_conversation(&self, conversation_id: &str) -> anyhow::Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), conversation_id],
        )?;
        Ok(())
    }

    /// Delete a conversation; messages, summary, and embedding rows go with
    /// it via foreign-key cascade. Returns the number of conversation rows
    /// removed (0 when the id was unknown).
    pub fn delete_conversation(&self, conversation_id: &str) -> anyhow::Result<usize> {
        let conn = self.get_conn()?;
        let deleted = conn.execute("DELETE FROM conversations WHERE id = ?1", [conversation_id])?;
        info!("Deleted conversation {} ({} row)", conversation_id, deleted);
        Ok(deleted)
    }

    pub fn store_message(&self, params: MessageParams) -> anyhow::Result<StoredMessage> {
        let now = Utc::now();

        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO messages
             (conversation_id, message_index, role, content, tokens, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                params.conversation_id,
                params.message_index,
                params.role,
                params.content,
                params.tokens,
                now.to_rfc3339(),
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!("Stored message {} (index {}) for conversation {}",
               id, params.message_index, params.conversation_id);

        Ok(StoredMessage {
            id,
            conversation_id: params.conversation_id.to_string(),
            message_index: params.message_index,
            role: params.role.to_string(),
            content: params.content.to_string(),
            tokens: params.tokens,
            timestamp: now,
        })
    }

    pub fn get_conversation_messages(
        &self,
        conversation_id: &str,
        limit: Option<i32>,
        offset: Option<i32>,
    ) -> anyhow::Result<Vec<StoredMessage>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, message_index, role, content, tokens, timestamp
             FROM messages WHERE conversation_id = ?1 ORDER BY message_index LIMIT ?2 OFFSET ?3"
        )?;
        let mut rows = stmt.query(params![conversation_id, limit.unwrap_or(10000), offset.unwrap_or(0)])?;
        let mut messages = Vec::new();
        while let Some(row) = rows.next()? {
            messages.push(self.row_to_stored_message(row)?);
        }
        Ok(messages)
    }

    pub fn get_message_count(&self, conversation_id: &str) -> anyhow::Result<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            [conversation_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn parse_datetime_safe(datetime_str: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(datetime_str) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S") {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S%.f") {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
        None
    }

    fn row_to_session(&self, row: &Row) -> anyhow::Result<Session> {
        let created_at = Self::parse_datetime_safe(&row.get::<_, String>(1)?)
            .unwrap_or_else(|| { warn!("Failed parse created_at"); Utc::now() });
        let last_accessed = Self::parse_datetime_safe(&row.get::<_, String>(2)?)
            .unwrap_or_else(|| { warn!("Failed parse last_accessed"); Utc::now() });

        Ok(Session { id: row.get(0)?, created_at, last_accessed })
    }

    fn row_to_conversation(&self, row: &Row) -> anyhow::Result<Conversation> {
        let created_at = Self::parse_datetime_safe(&row.get::<_, String>(5)?)
            .unwrap_or_else(|| { warn!("Failed parse created_at"); Utc::now() });
        let updated_at = Self::parse_datetime_safe(&row.get::<_, String>(6)?)
            .unwrap_or_else(|| { warn!("Failed parse updated_at"); Utc::now() });

        Ok(Conversation {
            id: row.get(0)?,
            session_id: row.get(1)?,
            bot_name: row.get(2)?,
            persona: row.get(3)?,
            model: row.get(4)?,
            created_at,
            updated_at,
        })
    }

    fn row_to_stored_message(&self, row: &Row) -> anyhow::Result<StoredMessage> {
        let timestamp = Self::parse_datetime_safe(&row.get::<_, String>(6)?)
            .unwrap_or_else(|| { warn!("Failed parse message timestamp"); Utc::now() });

        Ok(StoredMessage {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            message_index: row.get(2)?,
            role: row.get(3)?,
            content: row.get(4)?,
            tokens: row.get(5)?,
            timestamp,
        })
    }
}
