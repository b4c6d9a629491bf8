
//! Per-conversation similarity search over message embeddings.
//!
//! The composer depends only on this trait: higher score means more
//! relevant, ranking is descending, and nothing else about the scale is
//! promised. Swapping the in-process implementation for an external vector
//! store touches nothing in the context engine.
pub mod embedding_index;
pub use embedding_index::EmbeddingIndex;

use async_trait::async_trait;
use serde::Serialize;

/// A retrieved piece of prior conversation text with its relevance score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredSnippet {
    pub message_id: i64,
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub total_entries: usize,
    pub total_conversations: usize,
    pub dimension: usize,
}

#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Embed and store one message. Replaces any previous entry for the
    /// same message id.
    async fn upsert(&self, conversation_id: &str, message_id: i64, text: &str) -> anyhow::Result<()>;

    /// Top-k most similar indexed messages for `text` within one
    /// conversation, sorted descending by score.
    async fn query(&self, conversation_id: &str, text: &str, k: usize) -> anyhow::Result<Vec<ScoredSnippet>>;

    /// Drop every entry belonging to a conversation.
    async fn remove_conversation(&self, conversation_id: &str) -> anyhow::Result<()>;

    fn stats(&self) -> IndexStats;
}
