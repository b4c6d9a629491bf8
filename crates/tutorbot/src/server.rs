//! Server startup and routing.
//!
//! All subsystems are wired here once at startup and shared through
//! `AppState`; handlers reach them over Arcs with no network hops. The only
//! outbound calls are to the completion backend.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::{
    config::Config,
    context_engine::{ContextComposer, ConversationOrchestrator, RelevanceValidator},
    index::{EmbeddingIndex, SimilarityIndex},
    llm::{CompletionClient, EmbeddingClient, LlmSummarizer, LlmWorker, Summarize},
    memory_db::MemoryDatabase,
    shared_state::{AppState, AtomicCounters},
};

pub async fn run_server(cfg: Config) -> anyhow::Result<()> {
    crate::telemetry::init_tracing();
    crate::metrics::init_metrics();
    cfg.print_config();

    // Database, falling back to in-memory so a bad disk path degrades the
    // deployment instead of refusing to start
    let db_path = std::path::Path::new(&cfg.db_path);
    let database = match MemoryDatabase::new(db_path) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            warn!("Failed to open database at {}: {}. Falling back to in-memory.",
                  db_path.display(), e);
            Arc::new(MemoryDatabase::new_in_memory()?)
        }
    };

    let llm = Arc::new(LlmWorker::new(
        cfg.backend_url.clone(),
        cfg.embedding_model.clone(),
        cfg.completion_timeout(),
        cfg.embedding_timeout(),
        cfg.max_output_tokens,
    ));
    let completion: Arc<dyn CompletionClient> = llm.clone();
    let embedder: Arc<dyn EmbeddingClient> = llm;

    // Similarity index: reload persisted embeddings so retrieval works
    // immediately for conversations from earlier runs
    let embedding_index = Arc::new(EmbeddingIndex::new(
        embedder,
        database.clone(),
        cfg.embedding_model.clone(),
    ));
    match embedding_index.initialize() {
        Ok(()) => info!("Similarity index loaded from existing data"),
        Err(e) => warn!("Similarity index starts empty: {}", e),
    }
    let index: Arc<dyn SimilarityIndex> = embedding_index;

    let summarizer: Arc<dyn Summarize> = Arc::new(LlmSummarizer::new(
        completion.clone(),
        cfg.default_model.clone(),
        cfg.summary_max_tokens,
    ));

    let composer = ContextComposer::new(database.clone(), index.clone(), cfg.composer_config());
    let validator = RelevanceValidator::new(cfg.validator_config());
    let counters = Arc::new(AtomicCounters::new());

    let orchestrator = Arc::new(ConversationOrchestrator::new(
        database.clone(),
        composer,
        validator,
        completion,
        summarizer,
        index.clone(),
        counters.clone(),
        cfg.completion_timeout(),
        cfg.summary_timeout(),
    ));

    let request_timeout = Duration::from_secs(cfg.request_timeout_seconds);
    let addr = cfg.api_addr();
    let state = AppState {
        config: Arc::new(cfg),
        database,
        orchestrator,
        index,
        counters,
    };

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let app = build_router(state, request_timeout);

    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: AppState, request_timeout: Duration) -> axum::Router {
    use axum::{
        Router,
        routing::{get, post},
    };
    use tower_http::{
        cors::{Any, CorsLayer},
        timeout::TimeoutLayer,
        trace::TraceLayer,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/", get(crate::api::admin_api::root))
        .route("/chat", post(crate::api::chat_api::chat))
        .route("/session", post(crate::api::session_api::create_session))
        .route("/session/:id/conversations", get(crate::api::session_api::get_session_conversations))
        .route("/conversation/:id",
               get(crate::api::conversation_api::get_conversation)
               .delete(crate::api::conversation_api::delete_conversation))
        .route("/health", get(crate::api::admin_api::health))
        .route("/models", get(crate::api::admin_api::get_models))
        .route("/stats", get(crate::api::admin_api::get_stats))
        .route("/metrics", get(crate::metrics::get_metrics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}
