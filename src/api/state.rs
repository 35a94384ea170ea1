//! Application state for shared services

use std::sync::Arc;

use crate::domain::aop::WorkflowCatalog;
use crate::domain::conversation::ConversationStore;
use crate::infrastructure::services::ConversationServiceTrait;

/// Application state containing shared services using dynamic dispatch
#[derive(Clone)]
pub struct AppState {
    pub conversation_service: Arc<dyn ConversationServiceTrait>,
    pub catalog: Arc<WorkflowCatalog>,
    pub store: Arc<dyn ConversationStore>,
}

impl AppState {
    pub fn new(
        conversation_service: Arc<dyn ConversationServiceTrait>,
        catalog: Arc<WorkflowCatalog>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            conversation_service,
            catalog,
            store,
        }
    }
}
