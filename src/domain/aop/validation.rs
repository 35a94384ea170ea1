//! Answer validation interface

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{StepDefinition, WorkflowDefinition};
use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Classification of a candidate answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    Valid,
    Invalid,
    Cancel,
}

impl VerdictStatus {
    /// Lenient parse of a model-supplied status label
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "valid" => Some(Self::Valid),
            "invalid" => Some(Self::Invalid),
            "cancel" | "cancelled" | "canceled" => Some(Self::Cancel),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict for one validation attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub status: VerdictStatus,
    pub reason: String,
}

impl ValidationVerdict {
    pub fn valid(reason: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::Valid,
            reason: reason.into(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::Invalid,
            reason: reason.into(),
        }
    }

    pub fn cancel(reason: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::Cancel,
            reason: reason.into(),
        }
    }
}

/// Classifies a user's answer to an input step
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InputValidator: Send + Sync + fmt::Debug {
    /// Submit a validation prompt and return the verdict
    async fn validate(&self, prompt: &str) -> Result<ValidationVerdict, DomainError>;
}

/// Builds the prompt sent to the validator for one candidate answer
#[derive(Debug, Clone)]
pub struct ValidationPrompt<'a> {
    pub workflow_name: &'a str,
    pub step_id: &'a str,
    pub expected_input: &'a str,
    pub user_prompt: &'a str,
    pub answer: &'a str,
}

impl<'a> ValidationPrompt<'a> {
    pub fn for_step(workflow: &'a WorkflowDefinition, step: &'a StepDefinition, answer: &'a str) -> Self {
        Self {
            workflow_name: workflow.name(),
            step_id: step.id(),
            expected_input: step.expected_input().unwrap_or("any reasonable answer"),
            user_prompt: step.user_prompt().unwrap_or(""),
            answer,
        }
    }

    pub fn render(&self) -> String {
        format!(
            "You are validating a user's response in a customer support workflow.\n\
             Workflow: {workflow}\n\
             Step: {step}\n\
             Expected input: {expected}\n\
             System asked: \"{asked}\"\n\
             User provided: \"{answer}\"\n\n\
             Decide whether the user's response is an acceptable answer.\n\
             - \"valid\": the response provides the expected input.\n\
             - \"invalid\": the response is missing, malformed or off-topic.\n\
             - \"cancel\": the user wants to stop or cancel this request.\n\n\
             Respond with a JSON object only: {{\"status\": \"valid\" | \"invalid\" | \"cancel\", \
             \"reason\": \"<one short sentence>\"}}",
            workflow = self.workflow_name,
            step = self.step_id,
            expected = self.expected_input,
            asked = self.user_prompt,
            answer = self.answer,
        )
    }
}
