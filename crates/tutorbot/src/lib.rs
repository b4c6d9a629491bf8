pub mod api;
pub mod config;
pub mod context_engine;
pub mod error;
pub mod index;
pub mod llm;
pub mod memory_db;
pub mod metrics;
pub mod server;
pub mod shared_state;
pub mod telemetry;
pub mod token_counter;
pub mod utils;
pub mod workers;

// Public API exports
pub use config::Config;
pub use error::ChatError;
pub use server::run_server;

pub use context_engine::{
    ComposerConfig, ContextBundle, ContextComposer, ContextStrategy,
    ConversationOrchestrator, IssueKind, RelevanceValidator, ValidatorConfig,
};
pub use index::{EmbeddingIndex, ScoredSnippet, SimilarityIndex};
pub use token_counter::{ModelFamily, TokenCounter};
