//! Chat and workflow payloads

use serde::{Deserialize, Serialize};

use crate::domain::aop::{ConversationWorkflowState, TurnStatus, WorkflowDefinition};
use crate::domain::conversation::ChatMessage;
use crate::infrastructure::services::ChatTurn;

/// POST /v1/chat body
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Omitted on the first turn of a new conversation
    #[serde(default)]
    pub chat_id: Option<String>,
}

/// POST /v1/workflows/{name}/run body
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRunRequest {
    pub chat_id: String,
    #[serde(default)]
    pub message: String,
}

/// Reply to one chat turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub chat_id: String,
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Whether a workflow is still waiting on this chat
    pub active: bool,
}

impl From<ChatTurn> for ChatResponse {
    fn from(turn: ChatTurn) -> Self {
        let active = turn.status.as_ref().is_some_and(TurnStatus::is_active);

        Self {
            chat_id: turn.chat_id.to_string(),
            reply: turn.reply,
            workflow: turn.workflow,
            status: turn.status.map(|s| s.label().to_string()),
            active,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagesQuery {
    #[serde(default)]
    pub include_debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub chat_id: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateResponse {
    pub chat_id: String,
    pub state: ConversationWorkflowState,
}

/// Catalog entry as listed by GET /v1/workflows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub name: String,
    pub description: String,
    pub steps: usize,
    pub first_step: String,
}

impl From<&WorkflowDefinition> for WorkflowSummary {
    fn from(workflow: &WorkflowDefinition) -> Self {
        Self {
            name: workflow.name().to_string(),
            description: workflow.description().to_string(),
            steps: workflow.steps().len(),
            first_step: workflow.first_step().id().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowsResponse {
    pub workflows: Vec<WorkflowSummary>,
}
