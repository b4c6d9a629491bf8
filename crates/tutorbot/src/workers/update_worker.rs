
//! Post-turn memory refresh: index the turn's messages and fold them into
//! the running summary.
//!
//! Runs as a detached task after the response has already been returned.
//! Bounded by a timeout, retried once on failure, then dropped with a
//! warning; a dropped update just means the next successful turn folds a
//! little more history into the summary.
use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tracing::{debug, warn};

use crate::context_engine::orchestrator::TurnLocks;
use crate::index::SimilarityIndex;
use crate::llm::Summarize;
use crate::memory_db::{MemoryDatabase, RunningSummary, StoredMessage};
use crate::utils::TopicExtractor;

pub struct UpdateWorker {
    database: Arc<MemoryDatabase>,
    index: Arc<dyn SimilarityIndex>,
    summarizer: Arc<dyn Summarize>,
    locks: TurnLocks,
    timeout: Duration,
    topics: TopicExtractor,
}

impl UpdateWorker {
    pub fn new(
        database: Arc<MemoryDatabase>,
        index: Arc<dyn SimilarityIndex>,
        summarizer: Arc<dyn Summarize>,
        locks: TurnLocks,
        timeout: Duration,
    ) -> Self {
        Self {
            database,
            index,
            summarizer,
            locks,
            timeout,
            topics: TopicExtractor::default(),
        }
    }

    /// Detach the refresh for one completed turn.
    pub fn spawn(self: Arc<Self>, conversation_id: String, turn_messages: Vec<StoredMessage>) {
        tokio::spawn(async move {
            self.run(conversation_id, turn_messages).await;
        });
    }

    async fn run(&self, conversation_id: String, turn_messages: Vec<StoredMessage>) {
        // Same lock as the request path; the refresh can never interleave
        // with the next turn's composition.
        let lock = self.locks.lock_for(&conversation_id);
        let _guard = lock.lock().await;

        match tokio::time::timeout(self.timeout, self.apply(&conversation_id, &turn_messages)).await {
            Ok(Ok(())) => {
                debug!("Turn {}: SummaryUpdated", conversation_id);
            }
            Ok(Err(first)) => {
                warn!(
                    "Post-turn update failed for conversation {} (retrying once): {}",
                    conversation_id, first
                );
                match tokio::time::timeout(self.timeout, self.apply(&conversation_id, &turn_messages)).await {
                    Ok(Ok(())) => debug!("Turn {}: SummaryUpdated (after retry)", conversation_id),
                    Ok(Err(e)) => {
                        warn!("Dropping post-turn update for conversation {}: {}", conversation_id, e);
                        crate::metrics::inc_update_dropped();
                    }
                    Err(_) => {
                        warn!("Post-turn update retry timed out for conversation {}; dropping",
                              conversation_id);
                        crate::metrics::inc_update_dropped();
                    }
                }
            }
            Err(_) => {
                // Timeout is skipped rather than retried; the next turn's
                // update covers the gap.
                warn!(
                    "Post-turn update timed out after {:?} for conversation {}; skipping",
                    self.timeout, conversation_id
                );
                crate::metrics::inc_update_dropped();
            }
        }
    }

    async fn apply(&self, conversation_id: &str, turn_messages: &[StoredMessage]) -> anyhow::Result<()> {
        futures::future::try_join_all(
            turn_messages.iter()
                .map(|m| self.index.upsert(conversation_id, m.id, &m.content)),
        ).await?;

        // Fold every message the summary does not yet cover, not just this
        // turn; a previously dropped update heals here.
        let previous = self.database.summaries.get_summary(conversation_id)?;
        let covered_through = previous.as_ref().map(|s| s.last_message_index).unwrap_or(-1);
        let all_messages = self.database.conversations
            .get_conversation_messages(conversation_id, None, None)?;
        let new_messages: Vec<StoredMessage> = all_messages
            .into_iter()
            .filter(|m| m.message_index > covered_through)
            .collect();
        if new_messages.is_empty() {
            return Ok(());
        }

        let summary_text = self.summarizer
            .summarize(
                conversation_id,
                &new_messages,
                previous.as_ref().map(|s| s.summary_text.as_str()),
            )
            .await?;
        let last_index = new_messages.last().map(|m| m.message_index).unwrap_or(covered_through);
        let key_topics = self.topics
            .extract_from_texts(new_messages.iter().map(|m| m.content.as_str()));

        self.database.summaries.upsert_summary(&RunningSummary {
            conversation_id: conversation_id.to_string(),
            summary_text,
            key_topics,
            last_message_index: last_index,
            updated_at: Utc::now(),
        })?;

        Ok(())
    }
}
