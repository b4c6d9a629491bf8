
//! Per-turn orchestration: persist the query, compose and validate context,
//! call the completion service, persist the reply, then hand the summary
//! and index refresh to the background worker.
//!
//! Turns for the same conversation are serialized through a keyed async
//! mutex; turns for different conversations run fully in parallel. The
//! background refresh takes the same lock, so it can never race the next
//! turn's composition.
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::context_engine::composer::ContextComposer;
use crate::context_engine::prompt;
use crate::context_engine::validator::{RelevanceValidator, Validation};
use crate::error::ChatError;
use crate::index::SimilarityIndex;
use crate::llm::{CompletionClient, Summarize};
use crate::memory_db::conversation_store::MessageParams;
use crate::memory_db::{MemoryDatabase, StoredMessage};
use crate::shared_state::AtomicCounters;
use crate::token_counter::{ModelFamily, TokenCounter};
use crate::workers::UpdateWorker;

/// Keyed per-conversation locks. Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct TurnLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl TurnLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        self.inner
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn forget(&self, conversation_id: &str) {
        self.inner.remove(conversation_id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Received,
    ContextComposed,
    Validated,
    PromptSent,
    ResponseReceived,
    Failed,
    Persisted,
}

/// What a completed turn hands back to the request handler.
#[derive(Debug)]
pub struct TurnOutcome {
    pub response: String,
    pub model: String,
    pub response_time: f64,
    pub tokens_used: usize,
    pub context_used: bool,
    pub completion_failed: bool,
    pub validation: Validation,
}

pub struct ConversationOrchestrator {
    database: Arc<MemoryDatabase>,
    composer: ContextComposer,
    validator: RelevanceValidator,
    completion: Arc<dyn CompletionClient>,
    update_worker: Arc<UpdateWorker>,
    locks: TurnLocks,
    counters: Arc<AtomicCounters>,
    counter: TokenCounter,
    completion_timeout: Duration,
}

impl ConversationOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        database: Arc<MemoryDatabase>,
        composer: ContextComposer,
        validator: RelevanceValidator,
        completion: Arc<dyn CompletionClient>,
        summarizer: Arc<dyn Summarize>,
        index: Arc<dyn SimilarityIndex>,
        counters: Arc<AtomicCounters>,
        completion_timeout: Duration,
        update_timeout: Duration,
    ) -> Self {
        let locks = TurnLocks::new();
        let update_worker = Arc::new(UpdateWorker::new(
            database.clone(),
            index,
            summarizer,
            locks.clone(),
            update_timeout,
        ));

        info!("Conversation orchestrator initialized");
        Self {
            database,
            composer,
            validator,
            completion,
            update_worker,
            locks,
            counters,
            counter: TokenCounter,
            completion_timeout,
        }
    }

    /// Run one chat turn. Completion failures do not fail the turn: the
    /// caller receives a labeled fallback message and the exchange is
    /// persisted either way.
    pub async fn process_turn(&self, conversation_id: &str, query: &str) -> Result<TurnOutcome, ChatError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ChatError::InvalidRequest("Message content is empty".to_string()));
        }

        let start = Instant::now();
        let lock = self.locks.lock_for(conversation_id);
        let _guard = lock.lock().await;

        let mut state = TurnState::Received;
        debug!("Turn {}: {:?}", conversation_id, state);

        let conversation = self.database.conversations
            .get_conversation(conversation_id)
            .map_err(ChatError::Internal)?
            .ok_or_else(|| ChatError::ConversationNotFound(conversation_id.to_string()))?;
        let family = ModelFamily::from_model_name(&conversation.model);

        // History snapshot before this turn's query; it is what the
        // composer counts as "prior messages".
        let history = self.database.conversations
            .get_conversation_messages(conversation_id, None, None)
            .map_err(ChatError::Internal)?;

        let user_message = self.persist_with_retry(
            conversation_id, "user", query, history.len() as i32, family,
        )?;

        let bundle = self.composer.compose(query, &conversation, &history).await;
        state = TurnState::ContextComposed;
        debug!("Turn {}: {:?} ({} tokens)", conversation_id, state, bundle.total_tokens);
        crate::metrics::observe_context_tokens(bundle.total_tokens as f64);

        let summary_lag = self.database.summaries
            .get_summary(conversation_id)
            .ok()
            .flatten()
            .map(|s| history.len().saturating_sub((s.last_message_index + 1) as usize));
        let validation = self.validator.validate(query, &bundle, summary_lag);
        if validation.score < 0.3 {
            warn!(
                "Low context relevance ({:.2}) for conversation {}: {:?}",
                validation.score, conversation_id, validation.issues
            );
        }
        state = TurnState::Validated;
        debug!("Turn {}: {:?} (score {:.2})", conversation_id, state, validation.score);

        let context = prompt::render_context(&bundle);
        let full_prompt = prompt::build_prompt(&prompt::system_prompt(&conversation), &context, query);
        state = TurnState::PromptSent;
        debug!("Turn {}: {:?} ({} chars)", conversation_id, state, full_prompt.len());

        let completion_result = tokio::time::timeout(
            self.completion_timeout,
            self.completion.complete(&full_prompt, &conversation.model),
        ).await;

        let (response_text, completion_failed) = match completion_result {
            Ok(Ok(text)) => {
                state = TurnState::ResponseReceived;
                (text, false)
            }
            Ok(Err(e)) => {
                warn!("Completion failed for conversation {}: {}", conversation_id, e);
                state = TurnState::Failed;
                (fallback_message("the model returned an error"), true)
            }
            Err(_) => {
                warn!(
                    "Completion timed out after {:?} for conversation {}",
                    self.completion_timeout, conversation_id
                );
                state = TurnState::Failed;
                (fallback_message("the request timed out"), true)
            }
        };
        debug!("Turn {}: {:?}", conversation_id, state);

        let assistant_message = self.persist_with_retry(
            conversation_id, "assistant", &response_text, history.len() as i32 + 1, family,
        )?;
        state = TurnState::Persisted;
        debug!("Turn {}: {:?}", conversation_id, state);
        if let Err(e) = self.database.conversations.touch_conversation(conversation_id) {
            warn!("Failed to bump conversation timestamp: {}", e);
        }

        self.counters.inc_processed_turns();
        if completion_failed {
            self.counters.inc_failed_completions();
            crate::metrics::inc_turn("failed");
        } else {
            crate::metrics::inc_turn("ok");
            // Fire-and-forget; the worker re-acquires this conversation's
            // lock, so it cannot race the next turn.
            Arc::clone(&self.update_worker).spawn(
                conversation_id.to_string(),
                vec![user_message, assistant_message],
            );
        }

        Ok(TurnOutcome {
            tokens_used: self.counter.count(&full_prompt, family)
                + self.counter.count(&response_text, family),
            context_used: !bundle.is_empty(),
            response: response_text,
            model: conversation.model,
            response_time: start.elapsed().as_secs_f64(),
            completion_failed,
            validation,
        })
    }

    /// Drop the per-conversation lock entry once the conversation is gone.
    pub fn forget_conversation(&self, conversation_id: &str) {
        self.locks.forget(conversation_id);
    }

    fn persist_with_retry(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
        message_index: i32,
        family: ModelFamily,
    ) -> Result<StoredMessage, ChatError> {
        let tokens = self.counter.count(content, family) as i32;
        let params = || MessageParams {
            conversation_id,
            role,
            content,
            message_index,
            tokens,
        };

        match self.database.conversations.store_message(params()) {
            Ok(message) => Ok(message),
            Err(first) => {
                warn!(
                    "Message write failed for conversation {} (retrying once): {}",
                    conversation_id, first
                );
                self.database.conversations
                    .store_message(params())
                    .map_err(ChatError::Persistence)
            }
        }
    }
}

fn fallback_message(reason: &str) -> String {
    format!(
        "Sorry, I couldn't generate a response because {}. \
         Your message has been saved; please try again.",
        reason
    )
}
