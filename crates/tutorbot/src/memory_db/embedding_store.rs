
//! Embedding persistence. Vectors are bincode blobs; the in-process index
//! reloads them at startup so semantic retrieval survives restarts.
use crate::memory_db::schema::*;
use rusqlite::{params, Row};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

pub struct EmbeddingStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl EmbeddingStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    pub fn store_embedding(
        &self,
        conversation_id: &str,
        message_id: i64,
        text: &str,
        embedding: &[f32],
        model: &str,
    ) -> anyhow::Result<()> {
        let embedding_bytes = bincode::serialize(embedding)?;
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO embeddings
             (conversation_id, message_id, text, embedding, embedding_model, generated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![conversation_id, message_id, text, embedding_bytes, model,
                    Utc::now().to_rfc3339()],
        )?;
        debug!("Stored embedding for message {} ({} dims)", message_id, embedding.len());
        Ok(())
    }

    /// Load every stored embedding; used once at startup to rebuild the
    /// in-process index.
    pub fn load_all(&self) -> anyhow::Result<Vec<EmbeddingRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, message_id, text, embedding, embedding_model, generated_at
             FROM embeddings"
        )?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();

        while let Some(row) = rows.next()? {
            records.push(self.row_to_record(row)?);
        }

        Ok(records)
    }

    pub fn delete_conversation_embeddings(&self, conversation_id: &str) -> anyhow::Result<usize> {
        let conn = self.get_conn()?;
        let deleted = conn.execute(
            "DELETE FROM embeddings WHERE conversation_id = ?1",
            [conversation_id],
        )?;
        Ok(deleted)
    }

    pub fn count(&self) -> anyhow::Result<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn row_to_record(&self, row: &Row) -> anyhow::Result<EmbeddingRecord> {
        let embedding_bytes: Vec<u8> = row.get(4)?;
        let embedding: Vec<f32> = bincode::deserialize(&embedding_bytes)
            .map_err(|e| anyhow::anyhow!("Embedding deserialization error: {}", e))?;

        let generated_at_str: String = row.get(6)?;
        let generated_at = chrono::DateTime::parse_from_rfc3339(&generated_at_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse timestamp: {}", e))?
            .with_timezone(&Utc);

        Ok(EmbeddingRecord {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            message_id: row.get(2)?,
            text: row.get(3)?,
            embedding,
            embedding_model: row.get(5)?,
            generated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::memory_db::MemoryDatabase;
    use crate::memory_db::conversation_store::MessageParams;

    #[test]
    fn embedding_roundtrip_and_cascade_delete() {
        let db = MemoryDatabase::new_in_memory().unwrap();
        let session = db.conversations.create_session().unwrap();
        let conv = db.conversations
            .create_conversation(&session.id, "Ada", "tutor", "gemini-2.0-flash-exp")
            .unwrap();
        let msg = db.conversations.store_message(MessageParams {
            conversation_id: &conv.id,
            role: "user",
            content: "what is photosynthesis?",
            message_index: 0,
            tokens: 6,
        }).unwrap();

        let vector = vec![0.25f32, -0.5, 0.125];
        db.embeddings
            .store_embedding(&conv.id, msg.id, &msg.content, &vector, "backend")
            .unwrap();

        let loaded = db.embeddings.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].embedding, vector);
        assert_eq!(loaded[0].text, "what is photosynthesis?");

        db.embeddings.delete_conversation_embeddings(&conv.id).unwrap();
        assert_eq!(db.embeddings.count().unwrap(), 0);
    }
}
