
//! Language-model access: completion and embedding clients plus the
//! incremental conversation summarizer. The traits are the seams the rest
//! of the system depends on; tests substitute deterministic stubs.
pub mod worker;
pub mod summarizer;
pub use worker::LlmWorker;
pub use summarizer::{LlmSummarizer, Summarize};

use async_trait::async_trait;

/// "Given a prompt, return a completion." The backing service is a black
/// box reached over HTTP.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str, model: &str) -> anyhow::Result<String>;
}

/// "Given text, return a vector."
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>>;
}
