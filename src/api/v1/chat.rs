//! Chat turn endpoint

use axum::extract::State;
use tracing::info;

use crate::api::state::AppState;
use crate::api::types::{ApiError, ChatRequest, ChatResponse, Json};
use crate::domain::conversation::ChatId;

/// POST /v1/chat
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if request.message.trim().is_empty() {
        return Err(ApiError::bad_request("Message cannot be empty")
            .with_param("message")
            .with_code("empty_message"));
    }

    let chat_id = request.chat_id.map(ChatId::new).transpose()?;

    let turn = state
        .conversation_service
        .handle_message(chat_id, &request.message)
        .await?;

    info!(
        chat_id = %turn.chat_id,
        workflow = turn.workflow.as_deref().unwrap_or("-"),
        "Chat turn handled"
    );

    Ok(Json(ChatResponse::from(turn)))
}
