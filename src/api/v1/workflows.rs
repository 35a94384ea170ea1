//! Workflow catalog and direct run endpoints

use axum::extract::{Path, State};

use crate::api::state::AppState;
use crate::api::types::{
    ApiError, ChatResponse, Json, WorkflowRunRequest, WorkflowSummary, WorkflowsResponse,
};
use crate::domain::conversation::ChatId;

/// GET /v1/workflows
pub async fn list_workflows(State(state): State<AppState>) -> Json<WorkflowsResponse> {
    let workflows = state
        .catalog
        .iter()
        .map(|workflow| WorkflowSummary::from(workflow.as_ref()))
        .collect();

    Json(WorkflowsResponse { workflows })
}

/// POST /v1/workflows/{name}/run
pub async fn run_workflow(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<WorkflowRunRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let chat_id = ChatId::new(request.chat_id)?;

    let turn = state
        .conversation_service
        .run_workflow(&name, chat_id, &request.message)
        .await?;

    Ok(Json(ChatResponse::from(turn)))
}
