
//! Embedding-backed similarity index.
//!
//! Vectors live in an in-process per-conversation table and are mirrored to
//! the embeddings table so `initialize` can rebuild the index at startup.
//! Per-conversation corpora are small (tens of messages), so retrieval is a
//! cosine scan over the conversation's entries rather than an ANN
//! structure.
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::index::{IndexStats, ScoredSnippet, SimilarityIndex};
use crate::llm::EmbeddingClient;
use crate::memory_db::MemoryDatabase;

#[derive(Debug, Clone)]
struct IndexEntry {
    message_id: i64,
    text: String,
    vector: Vec<f32>,
}

pub struct EmbeddingIndex {
    embedder: Arc<dyn EmbeddingClient>,
    database: Arc<MemoryDatabase>,
    embedding_model: String,
    table: DashMap<String, Vec<IndexEntry>>,
}

impl EmbeddingIndex {
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        database: Arc<MemoryDatabase>,
        embedding_model: String,
    ) -> Self {
        Self {
            embedder,
            database,
            embedding_model,
            table: DashMap::new(),
        }
    }

    /// Rebuild the in-process table from persisted embeddings. Called once
    /// at process start; semantic retrieval is available immediately for
    /// conversations indexed in earlier runs.
    pub fn initialize(&self) -> anyhow::Result<()> {
        let records = self.database.embeddings.load_all()?;
        let count = records.len();

        for record in records {
            let mut entries = self.table.entry(record.conversation_id.clone()).or_default();
            entries.retain(|e| e.message_id != record.message_id);
            entries.push(IndexEntry {
                message_id: record.message_id,
                text: record.text,
                vector: record.embedding,
            });
        }

        info!("Similarity index initialized with {} stored embeddings", count);
        Ok(())
    }
}

#[async_trait]
impl SimilarityIndex for EmbeddingIndex {
    async fn upsert(&self, conversation_id: &str, message_id: i64, text: &str) -> anyhow::Result<()> {
        let text = text.trim();
        if text.is_empty() {
            debug!("Skipping empty message {} for indexing", message_id);
            return Ok(());
        }

        let mut vectors = self.embedder.embed(vec![text.to_string()]).await?;
        let vector = vectors.pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding backend returned no vector"))?;

        if let Err(e) = self.database.embeddings.store_embedding(
            conversation_id,
            message_id,
            text,
            &vector,
            &self.embedding_model,
        ) {
            // The in-memory entry still serves this process; only restart
            // durability is lost.
            warn!("Failed to persist embedding for message {}: {}", message_id, e);
        }

        let mut entries = self.table.entry(conversation_id.to_string()).or_default();
        entries.retain(|e| e.message_id != message_id);
        entries.push(IndexEntry {
            message_id,
            text: text.to_string(),
            vector,
        });

        Ok(())
    }

    async fn query(&self, conversation_id: &str, text: &str, k: usize) -> anyhow::Result<Vec<ScoredSnippet>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let entries: Vec<IndexEntry> = match self.table.get(conversation_id) {
            Some(entries) if !entries.is_empty() => entries.value().clone(),
            _ => {
                debug!("No index entries for conversation {}", conversation_id);
                return Ok(Vec::new());
            }
        };

        let mut vectors = self.embedder.embed(vec![text.to_string()]).await?;
        let query_vector = vectors.pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding backend returned no vector"))?;

        let mut scored: Vec<ScoredSnippet> = entries.iter()
            .map(|entry| ScoredSnippet {
                message_id: entry.message_id,
                text: entry.text.clone(),
                score: cosine_similarity(&query_vector, &entry.vector),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn remove_conversation(&self, conversation_id: &str) -> anyhow::Result<()> {
        self.table.remove(conversation_id);
        let deleted = self.database.embeddings.delete_conversation_embeddings(conversation_id)?;
        debug!("Removed {} embeddings for conversation {}", deleted, conversation_id);
        Ok(())
    }

    fn stats(&self) -> IndexStats {
        let total_entries: usize = self.table.iter().map(|e| e.value().len()).sum();
        let dimension = self.table.iter()
            .find_map(|e| e.value().first().map(|entry| entry.vector.len()))
            .unwrap_or(0);

        IndexStats {
            total_entries,
            total_conversations: self.table.len(),
            dimension,
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() { return 0.0; }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 { 0.0 } else { dot / (norm_a * norm_b) }
}
