
//! Context composition - the per-turn decision of which prior conversation
//! content accompanies the query to the completion service.
//!
//! Strategy is selected from the prior-message count `n`:
//! short conversations use only the recent window, medium ones combine the
//! last user questions with retrieval, long ones lean on the running summary
//! plus retrieval with the immediately preceding turn kept verbatim.
//! Whatever the strategy produces is then trimmed to the token budget,
//! least-important content first.
use std::collections::HashSet;
use std::sync::Arc;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::index::{ScoredSnippet, SimilarityIndex};
use crate::memory_db::{Conversation, MemoryDatabase, StoredMessage};
use crate::token_counter::{ModelFamily, TokenCounter};
use crate::utils::TextUtils;

#[derive(Debug, Clone)]
pub struct ComposerConfig {
    pub max_context_tokens: usize,
    pub similarity_score_floor: f32,
    pub recent_window_size: usize,
    pub retrieval_k: usize,
    /// Prior-message count at which retrieval starts.
    pub medium_conversation_threshold: usize,
    /// Prior-message count past which the summary replaces raw recency.
    pub long_conversation_threshold: usize,
    pub system_prompt_overhead_tokens: usize,
    pub summary_char_ceiling: usize,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 4000,
            similarity_score_floor: 0.15,
            recent_window_size: 4,
            retrieval_k: 5,
            medium_conversation_threshold: 4,
            long_conversation_threshold: 10,
            system_prompt_overhead_tokens: 200,
            summary_char_ceiling: 1200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextStrategy {
    /// No prior messages; nothing to compose.
    Empty,
    /// Short conversation: recent window only.
    RecentWindow,
    /// Medium conversation: recent user questions plus retrieval.
    Hybrid,
    /// Long conversation: running summary plus retrieval, preceding turn
    /// kept verbatim.
    SummarySearch,
}

/// The assembled context for one turn. Produced fresh per turn, never
/// persisted.
#[derive(Debug, Clone)]
pub struct ContextBundle {
    pub strategy: ContextStrategy,
    pub recent_messages: Vec<StoredMessage>,
    pub summary: Option<String>,
    pub snippets: Vec<ScoredSnippet>,
    /// Top raw retrieval score before the floor filter; None when retrieval
    /// was not attempted or returned nothing.
    pub best_retrieval_score: Option<f32>,
    pub total_tokens: usize,
}

impl ContextBundle {
    pub fn empty(strategy: ContextStrategy, total_tokens: usize) -> Self {
        Self {
            strategy,
            recent_messages: Vec::new(),
            summary: None,
            snippets: Vec::new(),
            best_retrieval_score: None,
            total_tokens,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.recent_messages.is_empty() && self.summary.is_none() && self.snippets.is_empty()
    }

    /// Message ids included in the bundle, recents then snippets.
    pub fn included_message_ids(&self) -> Vec<i64> {
        self.recent_messages.iter().map(|m| m.id)
            .chain(self.snippets.iter().map(|s| s.message_id))
            .collect()
    }
}

pub struct ContextComposer {
    database: Arc<MemoryDatabase>,
    index: Arc<dyn SimilarityIndex>,
    counter: TokenCounter,
    config: ComposerConfig,
}

impl ContextComposer {
    pub fn new(
        database: Arc<MemoryDatabase>,
        index: Arc<dyn SimilarityIndex>,
        config: ComposerConfig,
    ) -> Self {
        Self {
            database,
            index,
            counter: TokenCounter,
            config,
        }
    }

    /// Compose the context bundle for one turn. `history` is the
    /// conversation's message log before the incoming query; the query
    /// itself is never part of it.
    ///
    /// Never fails: an unreachable index or summary store degrades to
    /// whatever recency-based context is still available.
    pub async fn compose(
        &self,
        query: &str,
        conversation: &Conversation,
        history: &[StoredMessage],
    ) -> ContextBundle {
        let n = history.len();
        let family = ModelFamily::from_model_name(&conversation.model);

        let mut bundle = if n == 0 {
            // Nothing to retrieve and nothing to summarize; neither service
            // is consulted.
            ContextBundle::empty(ContextStrategy::Empty, 0)
        } else if n < self.config.medium_conversation_threshold {
            self.compose_recent(history)
        } else if n <= self.config.long_conversation_threshold {
            self.compose_hybrid(query, conversation, history).await
        } else {
            self.compose_summary_search(query, conversation, history).await
        };

        self.enforce_budget(&mut bundle, query, family);
        debug!(
            "Composed {:?} bundle for conversation {}: {} recents, {} snippets, summary={}, {} tokens",
            bundle.strategy,
            conversation.id,
            bundle.recent_messages.len(),
            bundle.snippets.len(),
            bundle.summary.is_some(),
            bundle.total_tokens,
        );
        bundle
    }

    fn compose_recent(&self, history: &[StoredMessage]) -> ContextBundle {
        let window = self.config.recent_window_size.min(history.len());
        let mut bundle = ContextBundle::empty(ContextStrategy::RecentWindow, 0);
        bundle.recent_messages = history[history.len() - window..].to_vec();
        bundle
    }

    async fn compose_hybrid(
        &self,
        query: &str,
        conversation: &Conversation,
        history: &[StoredMessage],
    ) -> ContextBundle {
        let mut bundle = ContextBundle::empty(ContextStrategy::Hybrid, 0);

        // Last two user questions, oldest first
        let mut questions: Vec<StoredMessage> = history.iter()
            .rev()
            .filter(|m| m.role == "user")
            .take(2)
            .cloned()
            .collect();
        questions.reverse();
        bundle.recent_messages = questions;

        let (snippets, best) = self.retrieve(query, conversation, &bundle.recent_messages).await;
        bundle.snippets = snippets;
        bundle.best_retrieval_score = best;
        bundle
    }

    async fn compose_summary_search(
        &self,
        query: &str,
        conversation: &Conversation,
        history: &[StoredMessage],
    ) -> ContextBundle {
        let mut bundle = ContextBundle::empty(ContextStrategy::SummarySearch, 0);

        bundle.summary = match self.database.summaries.get_summary(&conversation.id) {
            Ok(summary) => summary.map(|s| s.summary_text),
            Err(e) => {
                warn!("Summary lookup failed for conversation {}: {}; composing without it",
                      conversation.id, e);
                crate::metrics::inc_degraded_composition();
                None
            }
        };

        // Raw recency is represented by the summary, except the immediately
        // preceding turn which always rides along verbatim.
        bundle.recent_messages = most_recent_turn(history).to_vec();

        let (snippets, best) = self.retrieve(query, conversation, &bundle.recent_messages).await;
        bundle.snippets = snippets;
        bundle.best_retrieval_score = best;
        bundle
    }

    /// Query the index and filter the hits: score floor, drop hits whose
    /// source message is already in the recency set, and exact-text dedup.
    async fn retrieve(
        &self,
        query: &str,
        conversation: &Conversation,
        recents: &[StoredMessage],
    ) -> (Vec<ScoredSnippet>, Option<f32>) {
        let hits = match self.index.query(&conversation.id, query, self.config.retrieval_k).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Similarity search failed for conversation {}: {}; composing without retrieval",
                      conversation.id, e);
                crate::metrics::inc_degraded_composition();
                return (Vec::new(), None);
            }
        };

        let best = hits.first().map(|s| s.score);
        let recent_ids: HashSet<i64> = recents.iter().map(|m| m.id).collect();
        let mut seen_texts: HashSet<String> = recents.iter().map(|m| m.content.clone()).collect();

        let snippets = hits.into_iter()
            .filter(|s| s.score >= self.config.similarity_score_floor)
            .filter(|s| !recent_ids.contains(&s.message_id))
            .filter(|s| seen_texts.insert(s.text.clone()))
            .collect();

        (snippets, best)
    }

    fn bundle_cost(&self, bundle: &ContextBundle, query: &str, family: ModelFamily) -> usize {
        let mut total = self.config.system_prompt_overhead_tokens;
        total += self.counter.count(query, family);
        if let Some(ref summary) = bundle.summary {
            total += self.counter.count(summary, family);
        }
        total += self.counter.count_all(
            bundle.recent_messages.iter().map(|m| m.content.as_str()),
            family,
        );
        total += self.counter.count_all(
            bundle.snippets.iter().map(|s| s.text.as_str()),
            family,
        );
        total
    }

    /// Trim the bundle to the token budget. Drop order: lowest-scoring
    /// snippets, then oldest recent messages (never the most recent turn),
    /// then sentence-level summary truncation, then a hard character
    /// ceiling on the summary as the last resort.
    fn enforce_budget(&self, bundle: &mut ContextBundle, query: &str, family: ModelFamily) {
        let budget = self.config.max_context_tokens;
        bundle.total_tokens = self.bundle_cost(bundle, query, family);
        if bundle.total_tokens <= budget {
            return;
        }

        // (a) snippets, lowest score first (they are sorted descending)
        while bundle.total_tokens > budget && !bundle.snippets.is_empty() {
            bundle.snippets.pop();
            bundle.total_tokens = self.bundle_cost(bundle, query, family);
        }

        // (b) oldest recent messages, keeping the trailing turn intact
        let keep_floor = most_recent_turn(&bundle.recent_messages).len();
        while bundle.total_tokens > budget && bundle.recent_messages.len() > keep_floor {
            bundle.recent_messages.remove(0);
            bundle.total_tokens = self.bundle_cost(bundle, query, family);
        }

        // (c) summary truncation, whole sentences first
        if bundle.total_tokens > budget {
            if let Some(summary) = bundle.summary.take() {
                let trimmed = self.trim_summary(&summary, bundle, query, family);
                bundle.summary = trimmed;
                bundle.total_tokens = self.bundle_cost(bundle, query, family);
            }
        }

        if bundle.total_tokens > budget {
            // Trimming exhausted every droppable block and the bundle is
            // still over; this indicates a composer bug upstream.
            error!(
                "Context bundle still over budget after trimming ({} > {} tokens)",
                bundle.total_tokens, budget
            );
        }
    }

    /// `bundle` has already had its summary taken out, so its cost is the
    /// mandatory remainder the summary has to fit around.
    fn trim_summary(
        &self,
        summary: &str,
        bundle: &ContextBundle,
        query: &str,
        family: ModelFamily,
    ) -> Option<String> {
        let base = self.bundle_cost(bundle, query, family);
        let budget = self.config.max_context_tokens;
        let available = budget.saturating_sub(base);
        if available == 0 {
            warn!("No budget left for the summary; dropping it entirely");
            return None;
        }

        let sentences = TextUtils::split_sentences(summary);
        for keep in (1..=sentences.len()).rev() {
            let candidate = sentences[..keep].join(" ");
            if self.counter.count(&candidate, family) <= available {
                if keep < sentences.len() {
                    debug!("Truncated summary from {} to {} sentences", sentences.len(), keep);
                }
                return Some(candidate);
            }
        }

        // Last resort: fixed character ceiling
        let ceiling = self.config.summary_char_ceiling.min(available.saturating_mul(4));
        let hard = TextUtils::truncate_with_ellipsis(summary, ceiling).into_owned();
        if self.counter.count(&hard, family) <= available {
            warn!("Hard-truncated summary to {} chars to fit budget", ceiling);
            Some(hard)
        } else {
            warn!("Summary unfittable within budget; dropping it entirely");
            None
        }
    }
}

/// The trailing user/assistant exchange: the last message, plus the one
/// before it when the two form a user-assistant pair.
fn most_recent_turn(messages: &[StoredMessage]) -> &[StoredMessage] {
    match messages.len() {
        0 => messages,
        1 => &messages[messages.len() - 1..],
        len => {
            let last = &messages[len - 1];
            let prev = &messages[len - 2];
            if prev.role == "user" && last.role == "assistant" {
                &messages[len - 2..]
            } else {
                &messages[len - 1..]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexStats;
    use async_trait::async_trait;
    use chrono::Utc;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Canned index that counts queries and returns preset snippets.
    struct StubIndex {
        snippets: Vec<ScoredSnippet>,
        query_calls: AtomicUsize,
        fail: bool,
    }

    impl StubIndex {
        fn with(snippets: Vec<ScoredSnippet>) -> Self {
            Self { snippets, query_calls: AtomicUsize::new(0), fail: false }
        }

        fn failing() -> Self {
            Self { snippets: Vec::new(), query_calls: AtomicUsize::new(0), fail: true }
        }

        fn calls(&self) -> usize {
            self.query_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SimilarityIndex for StubIndex {
        async fn upsert(&self, _c: &str, _m: i64, _t: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn query(&self, _c: &str, _t: &str, k: usize) -> anyhow::Result<Vec<ScoredSnippet>> {
            self.query_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("index offline");
            }
            Ok(self.snippets.iter().take(k).cloned().collect())
        }

        async fn remove_conversation(&self, _c: &str) -> anyhow::Result<()> {
            Ok(())
        }

        fn stats(&self) -> IndexStats {
            IndexStats { total_entries: 0, total_conversations: 0, dimension: 0 }
        }
    }

    fn conversation(db: &MemoryDatabase) -> Conversation {
        let session = db.conversations.create_session().unwrap();
        db.conversations
            .create_conversation(&session.id, "Ada", "a patient tutor", "gemini-2.0-flash-exp")
            .unwrap()
    }

    fn message(id: i64, index: i32, role: &str, content: &str) -> StoredMessage {
        StoredMessage {
            id,
            conversation_id: "c".to_string(),
            message_index: index,
            role: role.to_string(),
            content: content.to_string(),
            tokens: (content.len() / 4) as i32,
            timestamp: Utc::now(),
        }
    }

    fn alternating_history(n: usize) -> Vec<StoredMessage> {
        (0..n).map(|i| {
            let role = if i % 2 == 0 { "user" } else { "assistant" };
            message(i as i64 + 1, i as i32, role, &format!("message number {} content", i))
        }).collect()
    }

    fn snippet(message_id: i64, text: &str, score: f32) -> ScoredSnippet {
        ScoredSnippet { message_id, text: text.to_string(), score }
    }

    fn composer_with(index: Arc<StubIndex>, config: ComposerConfig) -> (ContextComposer, Arc<MemoryDatabase>) {
        let db = Arc::new(MemoryDatabase::new_in_memory().unwrap());
        (ContextComposer::new(db.clone(), index, config), db)
    }

    #[tokio::test]
    async fn empty_conversation_composes_empty_bundle_without_index() {
        let index = Arc::new(StubIndex::with(vec![]));
        let (composer, db) = composer_with(index.clone(), ComposerConfig::default());
        let conv = conversation(&db);

        let bundle = composer.compose("What is photosynthesis?", &conv, &[]).await;
        assert_eq!(bundle.strategy, ContextStrategy::Empty);
        assert!(bundle.is_empty());
        assert_eq!(index.calls(), 0);

        // Cost is exactly query + fixed overhead
        let expected = ComposerConfig::default().system_prompt_overhead_tokens
            + TokenCounter.count("What is photosynthesis?", ModelFamily::Gemini);
        assert_eq!(bundle.total_tokens, expected);
    }

    #[tokio::test]
    async fn short_conversation_never_queries_index() {
        let index = Arc::new(StubIndex::with(vec![snippet(99, "should not appear", 0.9)]));
        let (composer, db) = composer_with(index.clone(), ComposerConfig::default());
        let conv = conversation(&db);

        for n in 1..=3 {
            let history = alternating_history(n);
            let bundle = composer.compose("follow-up question", &conv, &history).await;
            assert_eq!(bundle.strategy, ContextStrategy::RecentWindow);
            assert_eq!(bundle.recent_messages.len(), n.min(4));
            assert!(bundle.snippets.is_empty());
        }
        assert_eq!(index.calls(), 0);
    }

    #[tokio::test]
    async fn medium_conversation_combines_questions_and_retrieval() {
        let index = Arc::new(StubIndex::with(vec![
            snippet(101, "older relevant answer", 0.8),
            snippet(102, "tangential remark", 0.4),
            snippet(103, "noise below the floor", 0.05),
        ]));
        let (composer, db) = composer_with(index.clone(), ComposerConfig::default());
        let conv = conversation(&db);
        let history = alternating_history(6);

        let bundle = composer.compose("what did that mean?", &conv, &history).await;
        assert_eq!(bundle.strategy, ContextStrategy::Hybrid);
        assert_eq!(index.calls(), 1);

        // Last two user questions, chronological
        assert_eq!(bundle.recent_messages.len(), 2);
        assert!(bundle.recent_messages.iter().all(|m| m.role == "user"));
        assert!(bundle.recent_messages[0].message_index < bundle.recent_messages[1].message_index);

        // Floor filter applied, best raw score preserved
        assert_eq!(bundle.snippets.len(), 2);
        assert_eq!(bundle.best_retrieval_score, Some(0.8));
    }

    #[tokio::test]
    async fn long_conversation_uses_summary_and_preceding_turn() {
        let index = Arc::new(StubIndex::with(vec![snippet(55, "deep cut from turn three", 0.7)]));
        let (composer, db) = composer_with(index.clone(), ComposerConfig::default());
        let conv = conversation(&db);

        db.summaries.upsert_summary(&crate::memory_db::RunningSummary {
            conversation_id: conv.id.clone(),
            summary_text: "Covered limits, then derivatives.".to_string(),
            key_topics: vec!["derivatives".to_string()],
            last_message_index: 11,
            updated_at: Utc::now(),
        }).unwrap();

        let history = alternating_history(12);
        let bundle = composer.compose("What topics did we discuss?", &conv, &history).await;

        assert_eq!(bundle.strategy, ContextStrategy::SummarySearch);
        assert_eq!(bundle.summary.as_deref(), Some("Covered limits, then derivatives."));
        // Preceding turn rides along verbatim: trailing user+assistant pair
        assert_eq!(bundle.recent_messages.len(), 2);
        assert_eq!(bundle.recent_messages[0].role, "user");
        assert_eq!(bundle.recent_messages[1].role, "assistant");
        assert_eq!(bundle.recent_messages[1].message_index, 11);
        assert_eq!(bundle.snippets.len(), 1);
    }

    #[tokio::test]
    async fn snippet_duplicating_recent_message_appears_once() {
        // Snippet 5 is also the most recent user question
        let history = alternating_history(6);
        let dup = &history[4];
        assert_eq!(dup.role, "user");
        let index = Arc::new(StubIndex::with(vec![
            snippet(dup.id, &dup.content, 0.9),
            snippet(200, "a genuinely different message", 0.5),
        ]));
        let (composer, db) = composer_with(index, ComposerConfig::default());
        let conv = conversation(&db);

        let bundle = composer.compose("again?", &conv, &history).await;
        let ids = bundle.included_message_ids();
        let occurrences = ids.iter().filter(|&&id| id == dup.id).count();
        assert_eq!(occurrences, 1);
        assert_eq!(bundle.snippets.len(), 1);
        assert_eq!(bundle.snippets[0].message_id, 200);
    }

    #[tokio::test]
    async fn duplicate_snippet_text_is_deduplicated() {
        let index = Arc::new(StubIndex::with(vec![
            snippet(301, "the same words exactly", 0.9),
            snippet(302, "the same words exactly", 0.8),
        ]));
        let (composer, db) = composer_with(index, ComposerConfig::default());
        let conv = conversation(&db);

        let bundle = composer.compose("which one?", &conv, &alternating_history(6)).await;
        assert_eq!(bundle.snippets.len(), 1);
        assert_eq!(bundle.snippets[0].message_id, 301);
    }

    #[tokio::test]
    async fn index_failure_degrades_to_recency_only() {
        let index = Arc::new(StubIndex::failing());
        let (composer, db) = composer_with(index, ComposerConfig::default());
        let conv = conversation(&db);

        let bundle = composer.compose("still works?", &conv, &alternating_history(8)).await;
        assert_eq!(bundle.strategy, ContextStrategy::Hybrid);
        assert!(bundle.snippets.is_empty());
        assert!(bundle.best_retrieval_score.is_none());
        assert_eq!(bundle.recent_messages.len(), 2);
    }

    #[tokio::test]
    async fn compose_is_idempotent() {
        let index = Arc::new(StubIndex::with(vec![
            snippet(101, "first hit", 0.8),
            snippet(102, "second hit", 0.6),
        ]));
        let (composer, db) = composer_with(index, ComposerConfig::default());
        let conv = conversation(&db);
        let history = alternating_history(7);

        let first = composer.compose("repeat me", &conv, &history).await;
        let second = composer.compose("repeat me", &conv, &history).await;
        assert_eq!(first.strategy, second.strategy);
        assert_eq!(first.included_message_ids(), second.included_message_ids());
        assert_eq!(first.total_tokens, second.total_tokens);
    }

    // --- budget trimming ---

    fn tight_config(max_context_tokens: usize) -> ComposerConfig {
        ComposerConfig {
            max_context_tokens,
            system_prompt_overhead_tokens: 10,
            ..ComposerConfig::default()
        }
    }

    #[tokio::test]
    async fn lowest_scoring_snippet_is_dropped_first() {
        let filler = "w ".repeat(30);
        let index = Arc::new(StubIndex::with(vec![
            snippet(101, &format!("high value {}", filler), 0.9),
            snippet(102, &format!("low value {}", filler), 0.3),
        ]));
        // Each snippet costs ~32 tokens on top of a ~25-token base; a
        // 70-token budget fits recents + one snippet but not both
        let (composer, db) = composer_with(index, tight_config(70));
        let conv = conversation(&db);

        let bundle = composer.compose("q", &conv, &alternating_history(6)).await;
        assert_eq!(bundle.snippets.len(), 1);
        assert_eq!(bundle.snippets[0].message_id, 101);
        // Recents untouched before snippets are exhausted
        assert_eq!(bundle.recent_messages.len(), 2);
        assert!(bundle.total_tokens <= 70);
    }

    #[tokio::test]
    async fn oldest_recent_message_is_dropped_after_snippets() {
        let index = Arc::new(StubIndex::with(vec![]));
        // Two 7-token questions on a base of 11 tokens; a 20-token budget
        // forces exactly one recency drop
        let (composer, db) = composer_with(index, tight_config(20));
        let conv = conversation(&db);

        let history = alternating_history(6);
        let bundle = composer.compose("q", &conv, &history).await;

        assert_eq!(bundle.strategy, ContextStrategy::Hybrid);
        // The older question went; the newest stayed
        assert_eq!(bundle.recent_messages.len(), 1);
        assert_eq!(bundle.recent_messages[0].message_index, 4);
        assert!(bundle.total_tokens <= 20);
    }

    #[tokio::test]
    async fn summary_is_sentence_truncated_last() {
        let index = Arc::new(StubIndex::with(vec![]));
        let config = ComposerConfig {
            max_context_tokens: 45,
            system_prompt_overhead_tokens: 10,
            ..ComposerConfig::default()
        };
        let (composer, db) = composer_with(index, config);
        let conv = conversation(&db);

        let long_summary =
            "First important sentence here. Second supporting sentence follows. \
             Third sentence with more detail. Fourth sentence of padding text.";
        db.summaries.upsert_summary(&crate::memory_db::RunningSummary {
            conversation_id: conv.id.clone(),
            summary_text: long_summary.to_string(),
            key_topics: vec![],
            last_message_index: 11,
            updated_at: Utc::now(),
        }).unwrap();

        let history = alternating_history(12);
        let bundle = composer.compose("q", &conv, &history).await;

        let summary = bundle.summary.expect("summary should survive, truncated");
        assert!(summary.len() < long_summary.len());
        assert!(summary.starts_with("First important sentence here."));
        assert!(bundle.total_tokens <= 45);
        // The verbatim preceding turn is never sacrificed for the summary
        assert!(!bundle.recent_messages.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn composed_bundles_respect_the_budget(
            n in 0usize..30,
            words_per_message in 1usize..60,
            budget in 50usize..500,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            rt.block_on(async {
                let history: Vec<StoredMessage> = (0..n).map(|i| {
                    let role = if i % 2 == 0 { "user" } else { "assistant" };
                    message(
                        i as i64 + 1,
                        i as i32,
                        role,
                        &format!("word{} ", i).repeat(words_per_message),
                    )
                }).collect();

                let index = Arc::new(StubIndex::with(vec![
                    snippet(900, &"snippet text ".repeat(words_per_message), 0.9),
                    snippet(901, &"other snippet ".repeat(words_per_message), 0.5),
                ]));
                let config = ComposerConfig {
                    max_context_tokens: budget,
                    system_prompt_overhead_tokens: 10,
                    ..ComposerConfig::default()
                };
                let (composer, db) = composer_with(index, config);
                let conv = conversation(&db);
                db.summaries.upsert_summary(&crate::memory_db::RunningSummary {
                    conversation_id: conv.id.clone(),
                    summary_text: "One. Two. Three. Four. Five.".to_string(),
                    key_topics: vec![],
                    last_message_index: n as i32,
                    updated_at: Utc::now(),
                }).unwrap();

                let bundle = composer.compose("short query", &conv, &history).await;
                // The budget holds whenever the mandatory floor (query,
                // overhead, most recent turn) itself fits.
                let floor_cost = {
                    let mut floor = ContextBundle::empty(bundle.strategy, 0);
                    floor.recent_messages = most_recent_turn(&history).to_vec();
                    composer.bundle_cost(&floor, "short query", ModelFamily::Gemini)
                };
                if floor_cost <= budget {
                    assert!(bundle.total_tokens <= budget,
                            "bundle {} tokens over budget {}", bundle.total_tokens, budget);
                }
            });
        }
    }
}
