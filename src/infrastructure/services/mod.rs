//! Infrastructure services

mod conversation_service;

pub use conversation_service::{
    ChatTurn, ConversationService, ConversationServiceConfig, ConversationServiceTrait,
};
