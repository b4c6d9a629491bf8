
//! Database schema definitions for the conversation memory system
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// A browser session; owns zero or more conversations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

/// A persona-configured conversation between the user and the tutor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub session_id: String,
    pub bot_name: String,
    pub persona: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single persisted chat message. Append-only per conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub conversation_id: String,
    pub message_index: i32,
    pub role: String,
    pub content: String,
    pub tokens: i32,
    pub timestamp: DateTime<Utc>,
}

/// The incrementally refreshed digest of a conversation. One row per
/// conversation; `last_message_index` records how far into the message log
/// the digest reaches, which drives the staleness check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningSummary {
    pub conversation_id: String,
    pub summary_text: String,
    pub key_topics: Vec<String>,
    pub last_message_index: i32,
    pub updated_at: DateTime<Utc>,
}

/// A stored message embedding, one per indexed message.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub id: i64,
    pub conversation_id: String,
    pub message_id: i64,
    pub text: String,
    pub embedding: Vec<f32>,
    pub embedding_model: String,
    pub generated_at: DateTime<Utc>,
}

/// Aggregate counts for the /stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub total_sessions: i64,
    pub total_conversations: i64,
    pub total_messages: i64,
    pub total_summaries: i64,
    pub total_embeddings: i64,
    pub database_size_bytes: i64,
}

pub const SCHEMA_SQL: &str = "
-- Sessions table
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    created_at TIMESTAMP NOT NULL,
    last_accessed TIMESTAMP NOT NULL
);
-- Conversations table
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    bot_name TEXT NOT NULL,
    persona TEXT NOT NULL,
    model TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL,
    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
);
-- Messages table
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id TEXT NOT NULL,
    message_index INTEGER NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    tokens INTEGER NOT NULL,
    timestamp TIMESTAMP NOT NULL,
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
    UNIQUE(conversation_id, message_index)
);
-- Running summaries: one row per conversation, replaced after each turn
CREATE TABLE IF NOT EXISTS summaries (
    conversation_id TEXT PRIMARY KEY,
    summary_text TEXT NOT NULL,
    key_topics TEXT NOT NULL,
    last_message_index INTEGER NOT NULL,
    updated_at TIMESTAMP NOT NULL,
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);
-- Embeddings table
CREATE TABLE IF NOT EXISTS embeddings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id TEXT NOT NULL,
    message_id INTEGER NOT NULL,
    text TEXT NOT NULL,
    embedding BLOB NOT NULL,
    embedding_model TEXT NOT NULL,
    generated_at TIMESTAMP NOT NULL,
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE,
    UNIQUE(message_id, embedding_model)
);
-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_conversations_session ON conversations (session_id);
CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages (conversation_id);
CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages (timestamp);
CREATE INDEX IF NOT EXISTS idx_embeddings_conversation ON embeddings (conversation_id);
CREATE INDEX IF NOT EXISTS idx_embeddings_message ON embeddings (message_id);
";
