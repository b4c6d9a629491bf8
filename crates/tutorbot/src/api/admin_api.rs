//! Liveness, model catalogue, and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::Value;
use tracing::error;

use crate::error::ChatError;
use crate::shared_state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub services: ServiceStatus,
}

#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub database: bool,
    pub index: bool,
    pub completion_backend: String,
}

pub async fn root() -> Json<Value> {
    Json(serde_json::json!({ "message": "TutorBot API is running" }))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database_ok = state.database.get_stats().is_ok();

    Json(HealthResponse {
        status: if database_ok { "healthy".to_string() } else { "degraded".to_string() },
        model: state.config.default_model.clone(),
        services: ServiceStatus {
            database: database_ok,
            index: true,
            completion_backend: state.config.backend_url.clone(),
        },
    })
}

pub async fn get_models() -> Json<Value> {
    Json(serde_json::json!({
        "models": [
            {
                "id": "gemini-2.0-flash-exp",
                "name": "Gemini 2.0 Flash",
                "description": "Latest fast and efficient model for general tasks"
            },
            {
                "id": "gemini-1.5-flash",
                "name": "Gemini 1.5 Flash",
                "description": "Previous generation fast model"
            }
        ]
    }))
}

pub async fn get_stats(State(state): State<AppState>) -> Result<Json<Value>, ChatError> {
    let database_stats = state.database.get_stats().map_err(|e| {
        error!("Failed to read database stats: {}", e);
        ChatError::Internal(e)
    })?;
    let index_stats = state.index.stats();

    Ok(Json(serde_json::json!({
        "database": database_stats,
        "index": index_stats,
        "counters": state.counters.snapshot(),
    })))
}
