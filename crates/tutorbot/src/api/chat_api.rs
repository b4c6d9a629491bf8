//! The main chat endpoint.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::ChatError;
use crate::shared_state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Persona {
    pub bot_name: String,
    pub persona: String,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub persona: Persona,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub model: String,
    pub response_time: f64,
    pub tokens_used: usize,
    pub conversation_id: String,
    pub session_id: String,
    pub context_used: bool,
}

pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ChatError> {
    state.counters.inc_total_requests();

    let latest_message = request.messages.last()
        .ok_or_else(|| ChatError::InvalidRequest("No messages provided".to_string()))?
        .content
        .clone();

    let session = state.database.conversations
        .get_or_create_session(request.session_id.as_deref())
        .map_err(ChatError::Internal)?;

    // Resolve or create the conversation, verifying session ownership
    let conversation = match request.conversation_id {
        Some(ref id) => {
            let conversation = state.database.conversations
                .get_conversation(id)
                .map_err(ChatError::Internal)?
                .ok_or_else(|| ChatError::ConversationNotFound(id.clone()))?;
            if conversation.session_id != session.id {
                return Err(ChatError::ConversationNotFound(id.clone()));
            }
            conversation
        }
        None => state.database.conversations
            .create_conversation(
                &session.id,
                &request.persona.bot_name,
                &request.persona.persona,
                &request.persona.model,
            )
            .map_err(ChatError::Internal)?,
    };

    info!(
        "Chat turn for conversation {} (session {})",
        conversation.id, session.id
    );

    let outcome = state.orchestrator
        .process_turn(&conversation.id, &latest_message)
        .await
        .map_err(|e| {
            error!("Turn failed for conversation {}: {}", conversation.id, e);
            crate::metrics::inc_request("/chat", "error");
            e
        })?;

    crate::metrics::inc_request("/chat", "ok");
    Ok(Json(ChatResponse {
        response: outcome.response,
        model: outcome.model,
        response_time: outcome.response_time,
        tokens_used: outcome.tokens_used,
        conversation_id: conversation.id,
        session_id: session.id,
        context_used: outcome.context_used,
    }))
}
