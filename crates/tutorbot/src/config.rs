use anyhow::Result;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, warn};

use crate::context_engine::{ComposerConfig, ValidatorConfig};

/// Runtime configuration, read from the environment (optionally seeded
/// from a .env file). Every context-pipeline threshold lives here; the
/// defaults are tuned starting points, not correctness requirements.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub backend_url: String,
    pub default_model: String,
    pub embedding_model: String,
    pub db_path: String,

    // Context pipeline
    pub max_context_tokens: usize,
    pub similarity_score_floor: f32,
    pub recent_window_size: usize,
    pub retrieval_k: usize,
    pub medium_conversation_threshold: usize,
    pub long_conversation_threshold: usize,
    pub summary_max_tokens: usize,
    pub summary_char_ceiling: usize,
    pub summary_stale_turns: usize,
    pub system_prompt_overhead_tokens: usize,

    // Timeouts
    pub completion_timeout_seconds: u64,
    pub embedding_timeout_seconds: u64,
    pub summary_timeout_seconds: u64,
    pub request_timeout_seconds: u64,

    pub max_output_tokens: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("No .env file loaded ({}). Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }

        let llm_host = env::var("LLM_HOST").unwrap_or_else(|_| "127.0.0.1".into());
        let llm_port: u16 = env::var("LLM_PORT").unwrap_or_else(|_| "8081".into()).parse()?;
        let backend_url = env::var("LLM_BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", llm_host, llm_port));

        Ok(Self {
            api_host: env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            api_port: env::var("API_PORT").unwrap_or_else(|_| "8000".into()).parse()?,
            backend_url,
            default_model: env::var("DEFAULT_MODEL")
                .unwrap_or_else(|_| "gemini-2.0-flash-exp".into()),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "all-minilm".into()),
            db_path: env::var("DB_PATH")
                .unwrap_or_else(|_| "./data/conversations.db".into()),

            max_context_tokens: parse_or("MAX_CONTEXT_TOKENS", 4000)?,
            similarity_score_floor: env::var("SIMILARITY_SCORE_FLOOR")
                .unwrap_or_else(|_| "0.15".into())
                .parse()?,
            recent_window_size: parse_or("RECENT_WINDOW_SIZE", 4)?,
            retrieval_k: parse_or("RETRIEVAL_K", 5)?,
            medium_conversation_threshold: parse_or("MEDIUM_CONVERSATION_THRESHOLD", 4)?,
            long_conversation_threshold: parse_or("LONG_CONVERSATION_THRESHOLD", 10)?,
            summary_max_tokens: parse_or("SUMMARY_MAX_TOKENS", 300)?,
            summary_char_ceiling: parse_or("SUMMARY_CHAR_CEILING", 1200)?,
            summary_stale_turns: parse_or("SUMMARY_STALE_TURNS", 6)?,
            system_prompt_overhead_tokens: parse_or("SYSTEM_PROMPT_OVERHEAD_TOKENS", 200)?,

            completion_timeout_seconds: parse_or("COMPLETION_TIMEOUT_SECONDS", 120)? as u64,
            embedding_timeout_seconds: parse_or("EMBEDDING_TIMEOUT_SECONDS", 30)? as u64,
            summary_timeout_seconds: parse_or("SUMMARY_TIMEOUT_SECONDS", 60)? as u64,
            request_timeout_seconds: parse_or("REQUEST_TIMEOUT_SECONDS", 300)? as u64,

            max_output_tokens: parse_or("MAX_OUTPUT_TOKENS", 2048)? as u32,
        })
    }

    pub fn composer_config(&self) -> ComposerConfig {
        ComposerConfig {
            max_context_tokens: self.max_context_tokens,
            similarity_score_floor: self.similarity_score_floor,
            recent_window_size: self.recent_window_size,
            retrieval_k: self.retrieval_k,
            medium_conversation_threshold: self.medium_conversation_threshold,
            long_conversation_threshold: self.long_conversation_threshold,
            system_prompt_overhead_tokens: self.system_prompt_overhead_tokens,
            summary_char_ceiling: self.summary_char_ceiling,
        }
    }

    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            similarity_score_floor: self.similarity_score_floor,
            summary_stale_turns: self.summary_stale_turns,
            max_context_tokens: self.max_context_tokens,
        }
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_seconds)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding_timeout_seconds)
    }

    pub fn summary_timeout(&self) -> Duration {
        Duration::from_secs(self.summary_timeout_seconds)
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- API: {}:{}", self.api_host, self.api_port);
        info!("- Backend URL: {}", self.backend_url);
        info!("- Default Model: {}", self.default_model);
        info!("- Database: {}", self.db_path);
        info!("- Max Context Tokens: {}", self.max_context_tokens);
        info!("- Similarity Floor: {}", self.similarity_score_floor);
        info!("- Recent Window: {}", self.recent_window_size);
        info!("- Retrieval K: {}", self.retrieval_k);
        info!("- Conversation Thresholds: medium {} / long {}",
              self.medium_conversation_threshold, self.long_conversation_threshold);
        info!("- Completion Timeout: {}s", self.completion_timeout_seconds);
    }

    pub fn api_addr(&self) -> SocketAddr {
        format!("{}:{}", self.api_host, self.api_port).parse().unwrap()
    }
}

fn parse_or(key: &str, default: usize) -> Result<usize> {
    Ok(env::var(key).unwrap_or_else(|_| default.to_string()).parse()?)
}
