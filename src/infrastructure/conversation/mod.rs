//! Conversation store implementations

mod factory;
mod in_memory;
mod redis;

pub use factory::create_conversation_store;
pub use in_memory::InMemoryConversationStore;
pub use redis::RedisConversationStore;
