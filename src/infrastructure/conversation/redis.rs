//! Redis conversation store

use std::fmt;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use crate::domain::aop::ConversationWorkflowState;
use crate::domain::conversation::{ChatId, ChatMessage, ChatRole, ConversationStore, MessageType};
use crate::domain::DomainError;

/// Conversation store backed by Redis
///
/// State lives in `{prefix}:state:{chat_id}` as a JSON string; the log is the list
/// `{prefix}:messages:{chat_id}` of JSON-encoded messages.
#[derive(Clone)]
pub struct RedisConversationStore {
    connection: ConnectionManager,
    key_prefix: String,
}

impl fmt::Debug for RedisConversationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConversationStore")
            .field("key_prefix", &self.key_prefix)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisConversationStore {
    /// Connect to Redis at `url`
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> Result<Self, DomainError> {
        let client = Client::open(url)
            .map_err(|e| DomainError::storage(format!("Failed to create Redis client: {}", e)))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self {
            connection,
            key_prefix: key_prefix.into(),
        })
    }

    fn state_key(&self, chat_id: &ChatId) -> String {
        state_key(&self.key_prefix, chat_id)
    }

    fn messages_key(&self, chat_id: &ChatId) -> String {
        messages_key(&self.key_prefix, chat_id)
    }
}

fn state_key(prefix: &str, chat_id: &ChatId) -> String {
    format!("{}:state:{}", prefix, chat_id)
}

fn messages_key(prefix: &str, chat_id: &ChatId) -> String {
    format!("{}:messages:{}", prefix, chat_id)
}

/// Parse a stored state document, logging and discarding it when unreadable
fn decode_state(chat_id: &ChatId, json: &str) -> Option<ConversationWorkflowState> {
    match serde_json::from_str(json) {
        Ok(state) => Some(state),
        Err(e) => {
            tracing::warn!(
                chat_id = %chat_id,
                error = %e,
                "Discarding corrupt workflow state"
            );
            None
        }
    }
}

#[async_trait]
impl ConversationStore for RedisConversationStore {
    async fn get_state(
        &self,
        chat_id: &ChatId,
    ) -> Result<Option<ConversationWorkflowState>, DomainError> {
        let mut conn = self.connection.clone();

        let raw: Option<String> = conn.get(self.state_key(chat_id)).await.map_err(|e| {
            DomainError::storage(format!("Failed to load state for '{}': {}", chat_id, e))
        })?;

        let Some(json) = raw else {
            return Ok(None);
        };

        match decode_state(chat_id, &json) {
            Some(state) => Ok(Some(state)),
            None => {
                // Unreadable state is removed so the chat starts clean
                self.clear_state(chat_id).await?;
                Ok(None)
            }
        }
    }

    async fn set_state(
        &self,
        chat_id: &ChatId,
        state: &ConversationWorkflowState,
    ) -> Result<(), DomainError> {
        let json = serde_json::to_string(state)
            .map_err(|e| DomainError::internal(format!("Failed to serialize state: {}", e)))?;
        let mut conn = self.connection.clone();

        let _: () = conn.set(self.state_key(chat_id), json).await.map_err(|e| {
            DomainError::storage(format!("Failed to save state for '{}': {}", chat_id, e))
        })?;

        Ok(())
    }

    async fn clear_state(&self, chat_id: &ChatId) -> Result<(), DomainError> {
        let mut conn = self.connection.clone();

        let _: i64 = conn.del(self.state_key(chat_id)).await.map_err(|e| {
            DomainError::storage(format!("Failed to clear state for '{}': {}", chat_id, e))
        })?;

        Ok(())
    }

    async fn add_message(
        &self,
        chat_id: &ChatId,
        role: ChatRole,
        text: &str,
        msg_type: MessageType,
    ) -> Result<(), DomainError> {
        let message = ChatMessage::new(role, text, msg_type);
        let json = serde_json::to_string(&message)
            .map_err(|e| DomainError::internal(format!("Failed to serialize message: {}", e)))?;
        let mut conn = self.connection.clone();

        let _: i64 = conn.rpush(self.messages_key(chat_id), json).await.map_err(|e| {
            DomainError::storage(format!("Failed to append message for '{}': {}", chat_id, e))
        })?;

        Ok(())
    }

    async fn messages(&self, chat_id: &ChatId) -> Result<Vec<ChatMessage>, DomainError> {
        let mut conn = self.connection.clone();

        let raw: Vec<String> = conn
            .lrange(self.messages_key(chat_id), 0, -1)
            .await
            .map_err(|e| {
                DomainError::storage(format!("Failed to load messages for '{}': {}", chat_id, e))
            })?;

        raw.iter()
            .map(|json| {
                serde_json::from_str(json).map_err(|e| {
                    DomainError::storage(format!("Corrupt message for '{}': {}", chat_id, e))
                })
            })
            .collect()
    }

    async fn ping(&self) -> Result<(), DomainError> {
        let mut conn = self.connection.clone();

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| DomainError::storage(format!("Redis ping failed: {}", e)))?;

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
