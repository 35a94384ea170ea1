//! Conversation domain - chat identifiers, message log and the store interface

mod chat_id;
mod message;
mod store;

pub use chat_id::{validate_chat_id, ChatId, MAX_CHAT_ID_LENGTH};
pub use message::{ChatMessage, ChatRole, MessageType};
pub use store::ConversationStore;

#[cfg(test)]
pub use store::MockConversationStore;
