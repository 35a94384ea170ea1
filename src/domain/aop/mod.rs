//! Agent Operating Procedure (AOP) domain
//!
//! Workflow definitions, the condition language used by decision steps, the action
//! registry and the validator / intent-matcher interfaces the engine depends on.

pub mod action;
pub mod catalog;
pub mod condition;
pub mod data;
pub mod definition;
pub mod error;
pub mod intent;
pub mod outcome;
pub mod state;
pub mod validation;

pub use action::{
    ActionError, ActionHandler, ActionInvocation, ActionOutcome, ActionRegistry, FnAction,
};
pub use catalog::{AopDocument, RuleDocument, StepDocument, WorkflowCatalog};
pub use condition::{CompareOp, Condition, ConditionError};
pub use data::WorkflowData;
pub use definition::{DecisionRule, StepDefinition, StepKind, WorkflowDefinition};
pub use error::AopError;
pub use intent::{intent_prompt, resolve_answer, IntentMatcher};
pub use outcome::{TurnOutcome, TurnStatus};
pub use state::ConversationWorkflowState;
pub use validation::{InputValidator, ValidationPrompt, ValidationVerdict, VerdictStatus};

#[cfg(test)]
pub use intent::MockIntentMatcher;
#[cfg(test)]
pub use validation::MockInputValidator;
