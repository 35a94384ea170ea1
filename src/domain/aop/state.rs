//! Persisted per-conversation workflow progress

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{WorkflowData, WorkflowDefinition};

/// Progress of the single active workflow of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationWorkflowState {
    pub workflow_name: String,
    pub current_step_id: String,
    #[serde(default)]
    pub awaiting_input: bool,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub data: WorkflowData,
    pub updated_at: DateTime<Utc>,
}

impl ConversationWorkflowState {
    /// Fresh state positioned at the workflow's first step
    pub fn start(workflow: &WorkflowDefinition) -> Self {
        Self {
            workflow_name: workflow.name().to_string(),
            current_step_id: workflow.first_step().id().to_string(),
            awaiting_input: false,
            retry_count: 0,
            data: WorkflowData::new(),
            updated_at: Utc::now(),
        }
    }

    /// Move to another step, resetting per-step bookkeeping
    pub fn move_to(&mut self, step_id: impl Into<String>) {
        self.current_step_id = step_id.into();
        self.awaiting_input = false;
        self.retry_count = 0;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn belongs_to(&self, workflow: &WorkflowDefinition) -> bool {
        self.workflow_name.eq_ignore_ascii_case(workflow.name())
    }
}
