//! Session endpoints: creation and the sidebar conversation list.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use tracing::{error, info};

use crate::error::ChatError;
use crate::shared_state::AppState;

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub id: String,
    pub bot_name: String,
    pub persona: String,
    pub model: String,
    pub created_at: String,
    pub updated_at: String,
    pub message_count: usize,
}

pub async fn create_session(
    State(state): State<AppState>,
) -> Result<Json<SessionResponse>, ChatError> {
    let session = state.database.conversations
        .create_session()
        .map_err(|e| {
            error!("Failed to create session: {}", e);
            ChatError::Internal(e)
        })?;

    Ok(Json(SessionResponse { session_id: session.id }))
}

pub async fn get_session_conversations(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<ConversationSummary>>, ChatError> {
    info!("Fetching conversations for session {}", session_id);

    state.database.conversations
        .get_session(&session_id)
        .map_err(ChatError::Internal)?
        .ok_or_else(|| ChatError::SessionNotFound(session_id.clone()))?;

    let conversations = state.database.conversations
        .get_session_conversations(&session_id)
        .map_err(ChatError::Internal)?;

    let summaries = conversations.into_iter()
        .map(|conversation| {
            let message_count = state.database.conversations
                .get_message_count(&conversation.id)
                .unwrap_or(0);
            ConversationSummary {
                id: conversation.id,
                bot_name: conversation.bot_name,
                persona: conversation.persona,
                model: conversation.model,
                created_at: conversation.created_at.to_rfc3339(),
                updated_at: conversation.updated_at.to_rfc3339(),
                message_count,
            }
        })
        .collect();

    Ok(Json(summaries))
}
