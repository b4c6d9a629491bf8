//! Error types for the chat turn and request boundary.
//!
//! Infrastructure failures inside auxiliary services (index, summarizer)
//! never surface here: the composer degrades to recency-only context and the
//! background updater logs and drops. Completion failures are also not
//! errors at this boundary; the orchestrator converts them into a fallback
//! assistant turn. What remains is the small set of conditions a request
//! handler has to map onto HTTP statuses.

use thiserror::Error;

/// Result type alias for turn-level operations.
pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Storage write failed even after a retry. Losing the user's message
    /// silently is unacceptable, so this becomes a request-level failure.
    #[error("Storage error: {0}")]
    Persistence(anyhow::Error),

    /// Conversation does not exist or belongs to a different session.
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    /// Session id does not exist.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Malformed or empty request payload.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(anyhow::Error),
}
