//! AOP definition and catalog errors

use thiserror::Error;

use super::ConditionError;
use crate::domain::DomainError;

/// Errors raised while building or loading workflow definitions
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AopError {
    #[error("Workflow name cannot be empty")]
    EmptyName,

    #[error("Workflow has no steps: {0}")]
    EmptyWorkflow(String),

    #[error("Step id cannot be empty in workflow '{0}'")]
    EmptyStepId(String),

    #[error("Duplicate step '{step}' in workflow '{workflow}'")]
    DuplicateStep { workflow: String, step: String },

    #[error("Step '{step}' in workflow '{workflow}' references unknown step '{target}'")]
    UnknownStepReference {
        workflow: String,
        step: String,
        target: String,
    },

    #[error("Invalid condition '{condition}' in step '{step}': {source}")]
    InvalidCondition {
        step: String,
        condition: String,
        source: ConditionError,
    },

    #[error("Duplicate workflow '{0}' in catalog")]
    DuplicateWorkflow(String),

    #[error("Unknown step type '{kind}' for step '{step}'")]
    UnknownStepType { step: String, kind: String },

    #[error("Catalog error: {0}")]
    Catalog(String),
}

impl AopError {
    pub fn empty_workflow(name: impl Into<String>) -> Self {
        Self::EmptyWorkflow(name.into())
    }

    pub fn duplicate_step(workflow: impl Into<String>, step: impl Into<String>) -> Self {
        Self::DuplicateStep {
            workflow: workflow.into(),
            step: step.into(),
        }
    }

    pub fn unknown_step_reference(
        workflow: impl Into<String>,
        step: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self::UnknownStepReference {
            workflow: workflow.into(),
            step: step.into(),
            target: target.into(),
        }
    }

    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog(message.into())
    }
}

impl From<AopError> for DomainError {
    fn from(err: AopError) -> Self {
        DomainError::configuration(err.to_string())
    }
}
