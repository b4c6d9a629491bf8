//! Conversation endpoints: transcript retrieval and deletion.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::error::ChatError;
use crate::memory_db::Conversation;
use crate::shared_state::AppState;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub role: String,
    pub content: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ConversationDetailResponse {
    pub conversation: Conversation,
    pub messages: Vec<MessageResponse>,
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<ConversationDetailResponse>, ChatError> {
    info!("Fetching conversation {}", conversation_id);

    let conversation = state.database.conversations
        .get_conversation(&conversation_id)
        .map_err(ChatError::Internal)?
        .ok_or_else(|| ChatError::ConversationNotFound(conversation_id.clone()))?;

    let messages = state.database.conversations
        .get_conversation_messages(&conversation_id, None, None)
        .map_err(ChatError::Internal)?
        .into_iter()
        .map(|message| MessageResponse {
            role: message.role,
            content: message.content,
            timestamp: message.timestamp.to_rfc3339(),
        })
        .collect();

    Ok(Json(ConversationDetailResponse { conversation, messages }))
}

/// Delete a conversation: database rows go via foreign-key cascade, the
/// similarity index entries and the per-conversation lock are cleared
/// explicitly.
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<Value>, ChatError> {
    info!("Deleting conversation {}", conversation_id);

    let deleted = state.database.conversations
        .delete_conversation(&conversation_id)
        .map_err(ChatError::Internal)?;
    if deleted == 0 {
        return Err(ChatError::ConversationNotFound(conversation_id));
    }

    if let Err(e) = state.index.remove_conversation(&conversation_id).await {
        // Orphaned index entries cannot be retrieved again (queries are
        // scoped by conversation id), so log and move on.
        error!("Failed to remove index entries for {}: {}", conversation_id, e);
    }
    state.orchestrator.forget_conversation(&conversation_id);

    Ok(Json(serde_json::json!({
        "success": true,
        "id": conversation_id
    })))
}
