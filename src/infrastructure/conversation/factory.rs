//! Conversation store selection

use std::sync::Arc;

use crate::config::{StoreBackend, StoreConfig};
use crate::domain::conversation::ConversationStore;
use crate::domain::DomainError;

use super::in_memory::InMemoryConversationStore;
use super::redis::RedisConversationStore;

/// Build the configured conversation store
pub async fn create_conversation_store(
    config: &StoreConfig,
) -> Result<Arc<dyn ConversationStore>, DomainError> {
    let store: Arc<dyn ConversationStore> = match config.backend {
        StoreBackend::InMemory => Arc::new(InMemoryConversationStore::new()),
        StoreBackend::Redis => Arc::new(
            RedisConversationStore::connect(&config.redis_url, config.key_prefix.clone()).await?,
        ),
    };

    tracing::info!(backend = store.backend_name(), "Conversation store ready");

    Ok(store)
}
