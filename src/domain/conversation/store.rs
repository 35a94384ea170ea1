//! Conversation store interface

use std::fmt::Debug;

use async_trait::async_trait;

use super::{ChatId, ChatMessage, ChatRole, MessageType};
use crate::domain::aop::ConversationWorkflowState;
use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Durable per-conversation workflow state and message log
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConversationStore: Send + Sync + Debug {
    /// Active workflow state, if any
    async fn get_state(&self, chat_id: &ChatId)
        -> Result<Option<ConversationWorkflowState>, DomainError>;

    /// Replace the active workflow state
    async fn set_state(
        &self,
        chat_id: &ChatId,
        state: &ConversationWorkflowState,
    ) -> Result<(), DomainError>;

    /// Remove the active workflow state; a no-op when none exists
    async fn clear_state(&self, chat_id: &ChatId) -> Result<(), DomainError>;

    /// Append a message to the conversation log
    async fn add_message(
        &self,
        chat_id: &ChatId,
        role: ChatRole,
        text: &str,
        msg_type: MessageType,
    ) -> Result<(), DomainError>;

    /// Full conversation log, oldest first
    async fn messages(&self, chat_id: &ChatId) -> Result<Vec<ChatMessage>, DomainError>;

    /// Connectivity check used by readiness probes
    async fn ping(&self) -> Result<(), DomainError>;

    /// Backend name for logs and health output
    fn backend_name(&self) -> &'static str;
}
