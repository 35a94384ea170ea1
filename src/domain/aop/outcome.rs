//! Result of one engine turn

use serde::Serialize;

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnStatus {
    /// Paused at an input step
    AwaitingInput { step_id: String },
    /// Answer rejected, same step asked again
    RetryRequested { attempt: u32, max_retries: u32 },
    /// User cancelled the workflow
    Cancelled,
    /// Retry ceiling reached, workflow cancelled
    RetriesExhausted,
    /// Workflow reached its end
    Completed,
    /// Definition fault, workflow abandoned
    Aborted,
    /// Another workflow is active for this chat
    Busy { active_workflow: String },
}

impl TurnStatus {
    /// Label used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::AwaitingInput { .. } => "awaiting_input",
            Self::RetryRequested { .. } => "retry_requested",
            Self::Cancelled => "cancelled",
            Self::RetriesExhausted => "retries_exhausted",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Busy { .. } => "busy",
        }
    }

    /// Whether the workflow instance still exists after the turn
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::AwaitingInput { .. } | Self::RetryRequested { .. } | Self::Busy { .. }
        )
    }
}

/// Reply and status of one engine turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    pub reply: String,
    #[serde(flatten)]
    pub status: TurnStatus,
}

impl TurnOutcome {
    pub fn new(reply: impl Into<String>, status: TurnStatus) -> Self {
        Self {
            reply: reply.into(),
            status,
        }
    }
}
