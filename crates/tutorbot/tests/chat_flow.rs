//! End-to-end turn flow over an in-memory database with stubbed
//! language-model services.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tutorbot::context_engine::{
    ComposerConfig, ContextComposer, ContextStrategy, ConversationOrchestrator,
    IssueKind, RelevanceValidator, ValidatorConfig,
};
use tutorbot::index::{EmbeddingIndex, SimilarityIndex};
use tutorbot::llm::{CompletionClient, EmbeddingClient, Summarize};
use tutorbot::memory_db::conversation_store::MessageParams;
use tutorbot::memory_db::{Conversation, MemoryDatabase, RunningSummary, StoredMessage};
use tutorbot::shared_state::AtomicCounters;

/// Deterministic bag-of-words embedder: similar wording yields similar
/// vectors, so retrieval ordering is stable across runs.
struct HashEmbedder;

#[async_trait]
impl EmbeddingClient for HashEmbedder {
    async fn embed(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| {
            let mut vector = vec![0.0f32; 16];
            for word in text.to_lowercase().split_whitespace() {
                let mut h: usize = 5381;
                for b in word.bytes() {
                    h = h.wrapping_mul(33) ^ b as usize;
                }
                vector[h % 16] += 1.0;
            }
            vector
        }).collect())
    }
}

struct EchoCompletion;

#[async_trait]
impl CompletionClient for EchoCompletion {
    async fn complete(&self, _prompt: &str, _model: &str) -> anyhow::Result<String> {
        Ok("Here is a helpful explanation.".to_string())
    }
}

struct DeadCompletion;

#[async_trait]
impl CompletionClient for DeadCompletion {
    async fn complete(&self, _prompt: &str, _model: &str) -> anyhow::Result<String> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok("unreachable".to_string())
    }
}

struct CannedSummarizer;

#[async_trait]
impl Summarize for CannedSummarizer {
    async fn summarize(
        &self,
        _conversation_id: &str,
        new_messages: &[StoredMessage],
        _previous_summary: Option<&str>,
    ) -> anyhow::Result<String> {
        Ok(format!("The conversation covered {} new messages.", new_messages.len()))
    }
}

struct Harness {
    database: Arc<MemoryDatabase>,
    orchestrator: ConversationOrchestrator,
    conversation: Conversation,
}

fn harness(completion: Arc<dyn CompletionClient>) -> Harness {
    let database = Arc::new(MemoryDatabase::new_in_memory().unwrap());
    let session = database.conversations.create_session().unwrap();
    let conversation = database.conversations
        .create_conversation(&session.id, "Ada", "a patient science tutor", "gemini-2.0-flash-exp")
        .unwrap();

    let index: Arc<dyn SimilarityIndex> = Arc::new(EmbeddingIndex::new(
        Arc::new(HashEmbedder),
        database.clone(),
        "test-embedder".to_string(),
    ));
    let composer = ContextComposer::new(database.clone(), index.clone(), ComposerConfig::default());
    let orchestrator = ConversationOrchestrator::new(
        database.clone(),
        composer,
        RelevanceValidator::new(ValidatorConfig::default()),
        completion,
        Arc::new(CannedSummarizer),
        index,
        Arc::new(AtomicCounters::new()),
        Duration::from_millis(300),
        Duration::from_millis(300),
    );

    Harness { database, orchestrator, conversation }
}

async fn wait_for_summary(database: &MemoryDatabase, conversation_id: &str) -> Option<RunningSummary> {
    for _ in 0..100 {
        if let Ok(Some(summary)) = database.summaries.get_summary(conversation_id) {
            return Some(summary);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    None
}

#[tokio::test]
async fn completion_timeout_leaves_a_consistent_transcript() {
    let h = harness(Arc::new(DeadCompletion));

    let outcome = h.orchestrator
        .process_turn(&h.conversation.id, "What is photosynthesis?")
        .await
        .unwrap();

    assert!(outcome.completion_failed);
    assert!(outcome.response.starts_with("Sorry"));

    // Exactly what GET /conversation/{id} would serve: the user message
    // and the labeled fallback, in order
    let messages = h.database.conversations
        .get_conversation_messages(&h.conversation.id, None, None)
        .unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, "user");
    assert_eq!(messages[0].content, "What is photosynthesis?");
    assert_eq!(messages[1].role, "assistant");
    assert!(messages[1].content.starts_with("Sorry"));
}

#[tokio::test]
async fn turns_accumulate_memory_across_the_conversation() {
    let h = harness(Arc::new(EchoCompletion));

    let first = h.orchestrator
        .process_turn(&h.conversation.id, "How do plants make energy?")
        .await
        .unwrap();
    // Nothing composed for an empty conversation
    assert!(!first.context_used);

    let summary = wait_for_summary(&h.database, &h.conversation.id).await
        .expect("first turn should produce a running summary");
    assert!(summary.summary_text.contains("2 new messages"));
    assert_eq!(summary.last_message_index, 1);

    let second = h.orchestrator
        .process_turn(&h.conversation.id, "And what about respiration?")
        .await
        .unwrap();
    // Two prior messages exist now, so the recent window rides along
    assert!(second.context_used);

    let messages = h.database.conversations
        .get_conversation_messages(&h.conversation.id, None, None)
        .unwrap();
    assert_eq!(messages.len(), 4);

    // The second turn's summary catches up over everything new
    for _ in 0..100 {
        let s = h.database.summaries.get_summary(&h.conversation.id).unwrap().unwrap();
        if s.last_message_index == 3 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("summary never caught up to message index 3");
}

#[tokio::test]
async fn long_conversation_composes_summary_plus_retrieval() {
    let database = Arc::new(MemoryDatabase::new_in_memory().unwrap());
    let session = database.conversations.create_session().unwrap();
    let conversation = database.conversations
        .create_conversation(&session.id, "Ada", "a patient science tutor", "gemini-2.0-flash-exp")
        .unwrap();

    let index = Arc::new(EmbeddingIndex::new(
        Arc::new(HashEmbedder),
        database.clone(),
        "test-embedder".to_string(),
    ));

    // Twelve prior messages, all indexed
    let contents = [
        "what are cells made of",
        "cells are made of organelles and membranes",
        "tell me about photosynthesis in plants",
        "photosynthesis converts light into chemical energy",
        "how does cellular respiration work",
        "respiration breaks down glucose to release energy",
        "what is the role of chlorophyll",
        "chlorophyll absorbs light for photosynthesis",
        "do animals photosynthesize",
        "no, animals rely on consuming other organisms",
        "what did mitochondria evolve from",
        "mitochondria likely evolved from engulfed bacteria",
    ];
    let mut history = Vec::new();
    for (i, content) in contents.iter().enumerate() {
        let role = if i % 2 == 0 { "user" } else { "assistant" };
        let message = database.conversations.store_message(MessageParams {
            conversation_id: &conversation.id,
            role,
            content,
            message_index: i as i32,
            tokens: (content.len() / 4) as i32,
        }).unwrap();
        index.upsert(&conversation.id, message.id, content).await.unwrap();
        history.push(message);
    }

    database.summaries.upsert_summary(&RunningSummary {
        conversation_id: conversation.id.clone(),
        summary_text: "Covered cell structure, photosynthesis, and respiration.".to_string(),
        key_topics: vec!["photosynthesis".to_string()],
        last_message_index: 11,
        updated_at: chrono::Utc::now(),
    }).unwrap();

    let search_index: Arc<dyn SimilarityIndex> = index.clone();
    let composer = ContextComposer::new(database.clone(), search_index, ComposerConfig::default());
    let bundle = composer
        .compose("what did we discuss about photosynthesis", &conversation, &history)
        .await;

    assert_eq!(bundle.strategy, ContextStrategy::SummarySearch);
    assert_eq!(
        bundle.summary.as_deref(),
        Some("Covered cell structure, photosynthesis, and respiration.")
    );
    // The preceding turn rides along verbatim
    assert_eq!(bundle.recent_messages.len(), 2);
    assert_eq!(bundle.recent_messages[1].content, contents[11]);
    // Retrieval produced capped, floored, scored snippets
    assert!(!bundle.snippets.is_empty());
    assert!(bundle.snippets.len() <= 5);
    assert!(bundle.snippets.iter().all(|s| s.score >= 0.15));
    assert!(bundle.total_tokens <= 4000);

    let validation = RelevanceValidator::new(ValidatorConfig::default())
        .validate("what did we discuss about photosynthesis", &bundle, Some(0));
    assert!(!validation.issues.contains(&IssueKind::EmptyContext));
    assert!(validation.score > 0.3);
}
