
//! Running-summary storage. One row per conversation, replaced after each
//! completed assistant turn.
use crate::memory_db::schema::*;
use rusqlite::{params, Row};
use chrono::{DateTime, Utc};
use moka::sync::Cache;
use tracing::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

pub struct SummaryStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
    // Read-through cache; compose reads the summary on every turn.
    cache: Cache<String, RunningSummary>,
}

impl SummaryStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self {
            pool,
            cache: Cache::builder()
                .max_capacity(500)
                .time_to_idle(Duration::from_secs(3600))
                .build(),
        }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get()
            .map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    pub fn get_summary(&self, conversation_id: &str) -> anyhow::Result<Option<RunningSummary>> {
        if let Some(summary) = self.cache.get(conversation_id) {
            return Ok(Some(summary));
        }

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT conversation_id, summary_text, key_topics, last_message_index, updated_at
             FROM summaries WHERE conversation_id = ?1"
        )?;
        let mut rows = stmt.query([conversation_id])?;

        if let Some(row) = rows.next()? {
            let summary = self.row_to_summary(row)?;
            self.cache.insert(conversation_id.to_string(), summary.clone());
            Ok(Some(summary))
        } else {
            Ok(None)
        }
    }

    pub fn upsert_summary(&self, summary: &RunningSummary) -> anyhow::Result<()> {
        debug!(
            "Storing summary for conversation {} (through message {})",
            summary.conversation_id,
            summary.last_message_index
        );

        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO summaries
             (conversation_id, summary_text, key_topics, last_message_index, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &summary.conversation_id,
                &summary.summary_text,
                serde_json::to_string(&summary.key_topics)?,
                summary.last_message_index,
                summary.updated_at.to_rfc3339(),
            ],
        )?;

        self.cache.insert(summary.conversation_id.clone(), summary.clone());
        Ok(())
    }

    pub fn delete_summary(&self, conversation_id: &str) -> anyhow::Result<usize> {
        let conn = self.get_conn()?;
        let deleted = conn.execute(
            "DELETE FROM summaries WHERE conversation_id = ?1",
            [conversation_id],
        )?;
        self.cache.invalidate(conversation_id);

        info!("Deleted {} summary row(s) for conversation {}", deleted, conversation_id);
        Ok(deleted)
    }

    fn row_to_summary(&self, row: &Row) -> anyhow::Result<RunningSummary> {
        let key_topics_json: String = row.get(2)?;
        let key_topics: Vec<String> = serde_json::from_str(&key_topics_json)
            .map_err(|e| anyhow::anyhow!("Failed to parse key_topics: {}", e))?;

        let updated_at_str: String = row.get(4)?;
        let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)?
            .with_timezone(&Utc);

        Ok(RunningSummary {
            conversation_id: row.get(0)?,
            summary_text: row.get(1)?,
            key_topics,
            last_message_index: row.get(3)?,
            updated_at,
        })
    }
}
