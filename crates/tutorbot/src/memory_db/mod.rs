
//! Memory database module - SQLite-based storage for conversations, summaries, and embeddings
pub mod schema;
pub mod conversation_store;
pub mod summary_store;
pub mod embedding_store;
pub use schema::*;
pub use conversation_store::ConversationStore;
pub use summary_store::SummaryStore;
pub use embedding_store::EmbeddingStore;

use std::path::Path;
use std::sync::Arc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

/// Owns the connection pool and hands out typed stores.
pub struct MemoryDatabase {
    pub conversations: ConversationStore,
    pub summaries: SummaryStore,
    pub embeddings: EmbeddingStore,
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl MemoryDatabase {
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        info!("Opening memory database at: {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Pragmas are per-connection, so they run in the pool's init hook
        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX,
            )
            .with_init(|conn| {
                conn.execute_batch(
                    "PRAGMA foreign_keys = ON;
                     PRAGMA journal_mode = WAL;
                     PRAGMA synchronous = NORMAL;
                     PRAGMA busy_timeout = 5000;",
                )
            });
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| anyhow::anyhow!("Failed to create connection pool: {}", e))?;

        {
            let conn = pool.get()?;
            conn.execute_batch(schema::SCHEMA_SQL)?;
        }
        let pool = Arc::new(pool);
        info!("Memory database initialized successfully");
        Ok(Self {
            conversations: ConversationStore::new(Arc::clone(&pool)),
            summaries: SummaryStore::new(Arc::clone(&pool)),
            embeddings: EmbeddingStore::new(Arc::clone(&pool)),
            pool,
        })
    }

    /// In-memory database for tests and the degraded-startup fallback.
    /// The pool is capped at one connection: each sqlite `:memory:`
    /// connection is a private database, so a larger pool would hand the
    /// stores unrelated empty databases.
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)?;
        {
            let conn = pool.get()?;
            conn.execute_batch(schema::SCHEMA_SQL)?;
        }
        let pool = Arc::new(pool);
        Ok(Self {
            conversations: ConversationStore::new(Arc::clone(&pool)),
            summaries: SummaryStore::new(Arc::clone(&pool)),
            embeddings: EmbeddingStore::new(Arc::clone(&pool)),
            pool,
        })
    }

    pub fn get_stats(&self) -> anyhow::Result<DatabaseStats> {
        let conn = self.pool.get()?;
        let count = |table: &str| -> anyhow::Result<i64> {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?)
        };
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;

        Ok(DatabaseStats {
            total_sessions: count("sessions")?,
            total_conversations: count("conversations")?,
            total_messages: count("messages")?,
            total_summaries: count("summaries")?,
            total_embeddings: count("embeddings")?,
            database_size_bytes: page_count * page_size,
        })
    }
}

impl Drop for MemoryDatabase {
    fn drop(&mut self) {
        if let Ok(conn) = self.pool.get() {
            let _ = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
        }
    }
}
