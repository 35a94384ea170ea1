//! Domain layer - Core business logic and entities

pub mod aop;
pub mod conversation;
pub mod error;
pub mod llm;

pub use aop::{
    ActionRegistry, ConversationWorkflowState, InputValidator, IntentMatcher, TurnOutcome,
    TurnStatus, ValidationVerdict, VerdictStatus, WorkflowCatalog, WorkflowData,
    WorkflowDefinition,
};
pub use conversation::{ChatId, ChatMessage, ChatRole, ConversationStore, MessageType};
pub use error::DomainError;
pub use llm::{
    FinishReason, LlmProvider, LlmRequest, LlmRequestBuilder, LlmResponse, LlmResponseFormat,
    Message, MessageRole, Usage,
};
