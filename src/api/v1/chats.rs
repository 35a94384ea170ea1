//! Conversation inspection endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::api::state::AppState;
use crate::api::types::{ApiError, Json, MessagesQuery, MessagesResponse, StateResponse};
use crate::domain::conversation::ChatId;

/// GET /v1/chats/{chat_id}/messages
pub async fn list_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let chat_id = ChatId::new(chat_id)?;
    let messages = state
        .conversation_service
        .history(&chat_id, query.include_debug)
        .await?;

    Ok(Json(MessagesResponse {
        chat_id: chat_id.to_string(),
        messages,
    }))
}

/// GET /v1/chats/{chat_id}/state
pub async fn get_state(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Json<StateResponse>, ApiError> {
    let chat_id = ChatId::new(chat_id)?;

    match state.conversation_service.state(&chat_id).await? {
        Some(workflow_state) => Ok(Json(StateResponse {
            chat_id: chat_id.to_string(),
            state: workflow_state,
        })),
        None => Err(ApiError::not_found(format!(
            "No active workflow for chat '{}'",
            chat_id
        ))),
    }
}

/// DELETE /v1/chats/{chat_id}/state
pub async fn reset_state(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let chat_id = ChatId::new(chat_id)?;

    if state.conversation_service.reset(&chat_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!(
            "No active workflow for chat '{}'",
            chat_id
        )))
    }
}
