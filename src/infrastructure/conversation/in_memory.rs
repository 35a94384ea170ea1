//! In-memory conversation store

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::aop::ConversationWorkflowState;
use crate::domain::conversation::{ChatId, ChatMessage, ChatRole, ConversationStore, MessageType};
use crate::domain::DomainError;

#[derive(Debug, Default)]
struct Conversation {
    state: Option<ConversationWorkflowState>,
    messages: Vec<ChatMessage>,
}

/// Thread-safe in-memory conversation store
///
/// Useful for testing and single-instance deployments. Data is lost when the process
/// terminates.
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of conversations with a state or at least one message
    pub fn conversation_count(&self) -> usize {
        self.conversations.read().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get_state(
        &self,
        chat_id: &ChatId,
    ) -> Result<Option<ConversationWorkflowState>, DomainError> {
        let conversations = self.conversations.read().map_err(|e| {
            DomainError::storage(format!("Failed to acquire read lock: {}", e))
        })?;

        Ok(conversations
            .get(chat_id.as_str())
            .and_then(|c| c.state.clone()))
    }

    async fn set_state(
        &self,
        chat_id: &ChatId,
        state: &ConversationWorkflowState,
    ) -> Result<(), DomainError> {
        let mut conversations = self.conversations.write().map_err(|e| {
            DomainError::storage(format!("Failed to acquire write lock: {}", e))
        })?;

        conversations
            .entry(chat_id.as_str().to_string())
            .or_default()
            .state = Some(state.clone());

        Ok(())
    }

    async fn clear_state(&self, chat_id: &ChatId) -> Result<(), DomainError> {
        let mut conversations = self.conversations.write().map_err(|e| {
            DomainError::storage(format!("Failed to acquire write lock: {}", e))
        })?;

        if let Some(conversation) = conversations.get_mut(chat_id.as_str()) {
            conversation.state = None;
        }

        Ok(())
    }

    async fn add_message(
        &self,
        chat_id: &ChatId,
        role: ChatRole,
        text: &str,
        msg_type: MessageType,
    ) -> Result<(), DomainError> {
        let mut conversations = self.conversations.write().map_err(|e| {
            DomainError::storage(format!("Failed to acquire write lock: {}", e))
        })?;

        conversations
            .entry(chat_id.as_str().to_string())
            .or_default()
            .messages
            .push(ChatMessage::new(role, text, msg_type));

        Ok(())
    }

    async fn messages(&self, chat_id: &ChatId) -> Result<Vec<ChatMessage>, DomainError> {
        let conversations = self.conversations.read().map_err(|e| {
            DomainError::storage(format!("Failed to acquire read lock: {}", e))
        })?;

        Ok(conversations
            .get(chat_id.as_str())
            .map(|c| c.messages.clone())
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<(), DomainError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "in_memory"
    }
}
