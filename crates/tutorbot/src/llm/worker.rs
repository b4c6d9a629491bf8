
//! HTTP client for the completion backend.
//!
//! Speaks the OpenAI-compatible surface (`/v1/chat/completions`,
//! `/v1/embeddings`) so any conforming backend or proxy works. Every call
//! carries its own timeout; a hung backend surfaces as an error turn, never
//! as an unbounded wait.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::llm::{CompletionClient, EmbeddingClient};

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

pub struct LlmWorker {
    backend_url: String,
    embedding_model: String,
    completion_timeout: Duration,
    embedding_timeout: Duration,
    max_output_tokens: u32,
    http_client: reqwest::Client,
}

impl LlmWorker {
    pub fn new(
        backend_url: String,
        embedding_model: String,
        completion_timeout: Duration,
        embedding_timeout: Duration,
        max_output_tokens: u32,
    ) -> Self {
        info!("LLM worker initialized with backend: {}", backend_url);
        Self {
            backend_url,
            embedding_model,
            completion_timeout,
            embedding_timeout,
            max_output_tokens,
            http_client: reqwest::Client::new(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.backend_url)
    }

    fn embeddings_url(&self) -> String {
        format!("{}/v1/embeddings", self.backend_url)
    }
}

#[async_trait]
impl CompletionClient for LlmWorker {
    async fn complete(&self, prompt: &str, model: &str) -> anyhow::Result<String> {
        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: self.max_output_tokens,
            temperature: 0.7,
            stream: false,
        };

        debug!("Sending completion request to {} (model {})", self.completions_url(), model);
        let response = self.http_client
            .post(self.completions_url())
            .timeout(self.completion_timeout)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: ChatCompletionResponse = response.json().await?;
        let text = body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .map(|m| m.content)
            .ok_or_else(|| anyhow::anyhow!("Completion response contained no choices"))?;

        Ok(text)
    }
}

#[async_trait]
impl EmbeddingClient for LlmWorker {
    async fn embed(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: self.embedding_model.clone(),
            input: texts,
        };

        let response = self.http_client
            .post(self.embeddings_url())
            .timeout(self.embedding_timeout)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: EmbeddingResponse = response.json().await?;
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_derived_from_backend() {
        let worker = LlmWorker::new(
            "http://127.0.0.1:8081".to_string(),
            "backend".to_string(),
            Duration::from_secs(120),
            Duration::from_secs(30),
            2048,
        );
        assert_eq!(worker.completions_url(), "http://127.0.0.1:8081/v1/chat/completions");
        assert_eq!(worker.embeddings_url(), "http://127.0.0.1:8081/v1/embeddings");
    }
}
