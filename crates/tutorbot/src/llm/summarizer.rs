
//! Incremental conversation summarization.
//!
//! After each assistant turn the orchestrator folds the newest exchange into
//! the running summary. The summarizer never runs on the request path; a
//! slow or failing summarization only means the next turn composes with a
//! slightly stale digest.
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::llm::CompletionClient;
use crate::memory_db::StoredMessage;
use crate::token_counter::{ModelFamily, TokenCounter};
use crate::utils::TextUtils;

#[async_trait]
pub trait Summarize: Send + Sync {
    /// Fold `new_messages` into `previous_summary`, producing a bounded
    /// digest of the conversation so far.
    async fn summarize(
        &self,
        conversation_id: &str,
        new_messages: &[StoredMessage],
        previous_summary: Option<&str>,
    ) -> anyhow::Result<String>;
}

pub struct LlmSummarizer {
    completion: Arc<dyn CompletionClient>,
    model: String,
    counter: TokenCounter,
    max_summary_tokens: usize,
}

impl LlmSummarizer {
    pub fn new(completion: Arc<dyn CompletionClient>, model: String, max_summary_tokens: usize) -> Self {
        Self {
            completion,
            model,
            counter: TokenCounter,
            max_summary_tokens,
        }
    }

    fn build_prompt(&self, new_messages: &[StoredMessage], previous_summary: Option<&str>) -> String {
        let mut exchange = String::new();
        for message in new_messages {
            let speaker = if message.role == "user" { "User" } else { "Assistant" };
            exchange.push_str(speaker);
            exchange.push_str(": ");
            exchange.push_str(&TextUtils::normalize_whitespace(&message.content));
            exchange.push('\n');
        }

        format!(
            "You are tasked with updating a conversation summary.\n\n\
             Current Summary:\n{}\n\n\
             Latest Exchange:\n{}\n\
             Please write a new, concise summary (under 200 words) that:\n\
             1. Integrates the new exchange into the existing summary\n\
             2. Keeps the topics discussed, open questions, and any difficulties the user expressed\n\
             3. Notes the user's apparent learning progress\n\
             4. Is written in a clear, educational tone\n\n\
             New Summary:",
            previous_summary.unwrap_or("No previous summary available."),
            exchange,
        )
    }

    /// Sentence-level truncation down to the configured token bound, with a
    /// character-ceiling cut as the last resort.
    fn bound_summary(&self, summary: &str) -> String {
        let family = ModelFamily::from_model_name(&self.model);
        if self.counter.count(summary, family) <= self.max_summary_tokens {
            return summary.to_string();
        }

        let sentences = TextUtils::split_sentences(summary);
        for keep in (1..sentences.len()).rev() {
            let candidate = sentences[..keep].join(" ");
            if self.counter.count(&candidate, family) <= self.max_summary_tokens {
                return candidate;
            }
        }

        TextUtils::truncate_with_ellipsis(summary, self.max_summary_tokens * 4).into_owned()
    }
}

#[async_trait]
impl Summarize for LlmSummarizer {
    async fn summarize(
        &self,
        conversation_id: &str,
        new_messages: &[StoredMessage],
        previous_summary: Option<&str>,
    ) -> anyhow::Result<String> {
        if new_messages.is_empty() {
            return Ok(previous_summary.unwrap_or_default().to_string());
        }

        let prompt = self.build_prompt(new_messages, previous_summary);
        let raw = self.completion.complete(&prompt, &self.model).await?;
        let bounded = self.bound_summary(raw.trim());

        debug!(
            "Updated summary for conversation {} ({} chars)",
            conversation_id,
            bounded.len()
        );
        Ok(bounded)
    }
}
