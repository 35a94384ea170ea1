//! Versioned chat API

pub mod chat;
pub mod chats;
pub mod workflows;

use axum::{
    routing::{get, post},
    Router,
};

use super::state::AppState;

/// Create v1 API router
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat::chat))
        .route("/workflows", get(workflows::list_workflows))
        .route("/workflows/{name}/run", post(workflows::run_workflow))
        .route("/chats/{chat_id}/messages", get(chats::list_messages))
        .route(
            "/chats/{chat_id}/state",
            get(chats::get_state).delete(chats::reset_state),
        )
}
