
//! HTTP API endpoints
pub mod chat_api;
pub mod session_api;
pub mod conversation_api;
pub mod admin_api;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::ChatError;

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = match &self {
            ChatError::Persistence(_) | ChatError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ChatError::ConversationNotFound(_) | ChatError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ChatError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}
