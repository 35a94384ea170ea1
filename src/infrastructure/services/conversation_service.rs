//! Conversation service: routes chat turns to workflows or general chat

use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::domain::aop::{
    ConversationWorkflowState, IntentMatcher, TurnOutcome, TurnStatus, WorkflowCatalog,
};
use crate::domain::conversation::{ChatId, ChatMessage, ChatRole, ConversationStore, MessageType};
use crate::domain::{DomainError, LlmProvider, LlmRequest};
use crate::infrastructure::aop::AopEngine;
use crate::infrastructure::observability::{record_llm_request, LlmRequestMetricParams};

const CHAT_APOLOGY: &str =
    "Sorry, I'm having trouble answering right now. Please try again in a moment.";
const MISSING_WORKFLOW_APOLOGY: &str =
    "Sorry, I can no longer continue that request. Please tell me again what you need.";

/// Earlier replies sent along with a general-chat request
const HISTORY_WINDOW: usize = 10;

/// Conversation service configuration
#[derive(Debug, Clone)]
pub struct ConversationServiceConfig {
    /// Model used for general chat
    pub model: String,
    /// System prompt for general chat
    pub system_prompt: String,
    /// Idle time after which a chat's lock is dropped
    pub lock_idle: Duration,
}

impl Default for ConversationServiceConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            system_prompt: "You are a helpful customer support assistant.".to_string(),
            lock_idle: Duration::from_secs(600),
        }
    }
}

/// Result of one chat turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub chat_id: ChatId,
    pub reply: String,
    /// Workflow that handled the turn, if any
    pub workflow: Option<String>,
    /// Engine status when a workflow handled the turn
    pub status: Option<TurnStatus>,
}

impl ChatTurn {
    fn from_outcome(chat_id: ChatId, workflow: &str, outcome: TurnOutcome) -> Self {
        Self {
            chat_id,
            reply: outcome.reply,
            workflow: Some(workflow.to_string()),
            status: Some(outcome.status),
        }
    }

    fn chat(chat_id: ChatId, reply: String) -> Self {
        Self {
            chat_id,
            reply,
            workflow: None,
            status: None,
        }
    }
}

/// Trait for the conversation service (for dynamic dispatch in AppState)
#[async_trait]
pub trait ConversationServiceTrait: Send + Sync + Debug {
    /// Handle one inbound chat message, allocating a chat id when none is given
    async fn handle_message(
        &self,
        chat_id: Option<ChatId>,
        message: &str,
    ) -> Result<ChatTurn, DomainError>;

    /// Run one turn of a named workflow directly
    async fn run_workflow(
        &self,
        name: &str,
        chat_id: ChatId,
        message: &str,
    ) -> Result<ChatTurn, DomainError>;

    /// Conversation log, optionally including debug narration
    async fn history(
        &self,
        chat_id: &ChatId,
        include_debug: bool,
    ) -> Result<Vec<ChatMessage>, DomainError>;

    /// Active workflow state, if any
    async fn state(&self, chat_id: &ChatId)
        -> Result<Option<ConversationWorkflowState>, DomainError>;

    /// Drop the active workflow; returns whether one existed
    async fn reset(&self, chat_id: &ChatId) -> Result<bool, DomainError>;
}

/// Conversation service implementation
#[derive(Debug)]
pub struct ConversationService {
    store: Arc<dyn ConversationStore>,
    catalog: Arc<WorkflowCatalog>,
    engine: AopEngine,
    intent: Arc<dyn IntentMatcher>,
    llm: Arc<dyn LlmProvider>,
    config: ConversationServiceConfig,
    locks: Cache<String, Arc<Mutex<()>>>,
}

impl ConversationService {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        catalog: Arc<WorkflowCatalog>,
        engine: AopEngine,
        intent: Arc<dyn IntentMatcher>,
        llm: Arc<dyn LlmProvider>,
        config: ConversationServiceConfig,
    ) -> Self {
        let locks = Cache::builder().time_to_idle(config.lock_idle).build();

        Self {
            store,
            catalog,
            engine,
            intent,
            llm,
            config,
            locks,
        }
    }

    /// Per-chat lock serializing turns of one conversation
    async fn lock_for(&self, chat_id: &ChatId) -> Arc<Mutex<()>> {
        self.locks
            .get_with(chat_id.as_str().to_string(), async {
                Arc::new(Mutex::new(()))
            })
            .await
    }

    async fn resume(
        &self,
        chat_id: ChatId,
        state: ConversationWorkflowState,
        message: &str,
    ) -> Result<ChatTurn, DomainError> {
        let Some(workflow) = self.catalog.get(&state.workflow_name) else {
            warn!(
                chat_id = %chat_id,
                workflow = %state.workflow_name,
                "Active workflow missing from catalog, clearing state"
            );

            self.store.clear_state(&chat_id).await?;
            self.store
                .add_message(
                    &chat_id,
                    ChatRole::Agent,
                    &format!("Workflow {} not found in catalog", state.workflow_name),
                    MessageType::Debug,
                )
                .await?;
            self.store
                .add_message(
                    &chat_id,
                    ChatRole::Agent,
                    MISSING_WORKFLOW_APOLOGY,
                    MessageType::Reply,
                )
                .await?;

            return Ok(ChatTurn {
                chat_id,
                reply: MISSING_WORKFLOW_APOLOGY.to_string(),
                workflow: Some(state.workflow_name),
                status: Some(TurnStatus::Aborted),
            });
        };

        let outcome = self.engine.run(&workflow, message, &chat_id).await?;
        Ok(ChatTurn::from_outcome(chat_id, workflow.name(), outcome))
    }

    /// General chat outside any workflow
    async fn general_chat(&self, chat_id: ChatId) -> Result<ChatTurn, DomainError> {
        let history = self.store.messages(&chat_id).await?;
        let recent = history
            .iter()
            .filter(|m| !m.is_debug())
            .rev()
            .take(HISTORY_WINDOW)
            .collect::<Vec<_>>();

        let mut builder = LlmRequest::builder().system(&self.config.system_prompt);
        for message in recent.into_iter().rev() {
            builder = match message.role {
                ChatRole::User => builder.user(&message.text),
                ChatRole::Agent => builder.assistant(&message.text),
            };
        }

        let start = Instant::now();
        let result = self.llm.chat(&self.config.model, builder.build()).await;

        record_llm_request(LlmRequestMetricParams {
            provider: self.llm.provider_name(),
            model: &self.config.model,
            purpose: "chat",
            duration: start.elapsed(),
            success: result.is_ok(),
        });

        let reply = match result {
            Ok(response) if !response.content().trim().is_empty() => {
                response.content().trim().to_string()
            }
            Ok(_) => {
                warn!(chat_id = %chat_id, "Chat model returned an empty reply");
                CHAT_APOLOGY.to_string()
            }
            Err(e) => {
                warn!(chat_id = %chat_id, error = %e, "Chat model call failed");
                CHAT_APOLOGY.to_string()
            }
        };

        self.store
            .add_message(&chat_id, ChatRole::Agent, &reply, MessageType::Reply)
            .await?;

        Ok(ChatTurn::chat(chat_id, reply))
    }
}

#[async_trait]
impl ConversationServiceTrait for ConversationService {
    #[instrument(skip(self, message))]
    async fn handle_message(
        &self,
        chat_id: Option<ChatId>,
        message: &str,
    ) -> Result<ChatTurn, DomainError> {
        let chat_id = chat_id.unwrap_or_else(ChatId::generate);

        let lock = self.lock_for(&chat_id).await;
        let _guard = lock.lock().await;

        self.store
            .add_message(&chat_id, ChatRole::User, message, MessageType::Reply)
            .await?;

        if let Some(state) = self.store.get_state(&chat_id).await? {
            return self.resume(chat_id, state, message).await;
        }

        let matched = self
            .intent
            .match_intent(message, &self.catalog)
            .await
            .and_then(|name| self.catalog.get(&name));

        match matched {
            Some(workflow) => {
                info!(chat_id = %chat_id, workflow = workflow.name(), "Intent matched");
                self.store
                    .add_message(
                        &chat_id,
                        ChatRole::Agent,
                        &format!("Starting AOP: {}", workflow.name()),
                        MessageType::Debug,
                    )
                    .await?;

                let outcome = self.engine.run(&workflow, message, &chat_id).await?;
                Ok(ChatTurn::from_outcome(chat_id, workflow.name(), outcome))
            }
            None => self.general_chat(chat_id).await,
        }
    }

    #[instrument(skip(self, chat_id, message), fields(chat_id = %chat_id))]
    async fn run_workflow(
        &self,
        name: &str,
        chat_id: ChatId,
        message: &str,
    ) -> Result<ChatTurn, DomainError> {
        let workflow = self
            .catalog
            .get(name)
            .ok_or_else(|| DomainError::not_found(format!("Workflow '{}'", name)))?;

        let lock = self.lock_for(&chat_id).await;
        let _guard = lock.lock().await;

        self.store
            .add_message(&chat_id, ChatRole::User, message, MessageType::Reply)
            .await?;

        let outcome = self.engine.run(&workflow, message, &chat_id).await?;
        Ok(ChatTurn::from_outcome(chat_id, workflow.name(), outcome))
    }

    async fn history(
        &self,
        chat_id: &ChatId,
        include_debug: bool,
    ) -> Result<Vec<ChatMessage>, DomainError> {
        let mut messages = self.store.messages(chat_id).await?;

        if !include_debug {
            messages.retain(|m| !m.is_debug());
        }

        Ok(messages)
    }

    async fn state(
        &self,
        chat_id: &ChatId,
    ) -> Result<Option<ConversationWorkflowState>, DomainError> {
        self.store.get_state(chat_id).await
    }

    #[instrument(skip(self))]
    async fn reset(&self, chat_id: &ChatId) -> Result<bool, DomainError> {
        let lock = self.lock_for(chat_id).await;
        let _guard = lock.lock().await;

        let existed = self.store.get_state(chat_id).await?.is_some();
        if existed {
            self.store.clear_state(chat_id).await?;
            info!(chat_id = %chat_id, "Active workflow cleared");
        }

        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aop::{
        ActionRegistry, MockInputValidator, MockIntentMatcher, StepDefinition,
        ValidationVerdict, WorkflowDefinition,
    };
    use crate::domain::llm::MockLlmProvider;
    use crate::infrastructure::conversation::InMemoryConversationStore;

    fn catalog() -> Arc<WorkflowCatalog> {
        let refund = WorkflowDefinition::new(
            "Refund",
            "Refund a booking",
            vec![
                StepDefinition::action("ask_ref")
                    .requiring_response("What is your booking reference?", "booking ref")
                    .with_next("do_refund"),
                StepDefinition::action("do_refund").with_action("initiate_refund"),
            ],
        )
        .unwrap();

        Arc::new(WorkflowCatalog::new(vec![refund]).unwrap())
    }

    struct Fixture {
        store: Arc<InMemoryConversationStore>,
        llm: Arc<MockLlmProvider>,
        service: ConversationService,
    }

    fn fixture(intent: MockIntentMatcher, llm: MockLlmProvider) -> Fixture {
        let store = Arc::new(InMemoryConversationStore::new());
        let llm = Arc::new(llm);

        let mut validator = MockInputValidator::new();
        validator
            .expect_validate()
            .returning(|_| Ok(ValidationVerdict::valid("ok")));

        let actions = ActionRegistry::new().with_fn("initiate_refund", |data| {
            data.insert("refund_processed", true);
            Ok(())
        });
        let engine = AopEngine::new(store.clone(), Arc::new(validator), Arc::new(actions));

        let service = ConversationService::new(
            store.clone(),
            catalog(),
            engine,
            Arc::new(intent),
            llm.clone(),
            ConversationServiceConfig::default(),
        );

        Fixture {
            store,
            llm,
            service,
        }
    }

    fn intent_returning(name: Option<&'static str>) -> MockIntentMatcher {
        let mut intent = MockIntentMatcher::new();
        intent
            .expect_match_intent()
            .returning(move |_, _| name.map(str::to_string));
        intent
    }

    #[tokio::test]
    async fn test_new_chat_gets_an_id() {
        let f = fixture(
            intent_returning(None),
            MockLlmProvider::new("openai").with_reply("Hello! How can I help?"),
        );

        let turn = f.service.handle_message(None, "hello").await.unwrap();

        assert_eq!(turn.reply, "Hello! How can I help?");
        assert!(turn.workflow.is_none());
        assert_eq!(f.store.messages(&turn.chat_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_matched_intent_starts_workflow() {
        let f = fixture(
            intent_returning(Some("Refund")),
            MockLlmProvider::new("openai").with_reply("unused"),
        );
        let chat_id = ChatId::new("c1").unwrap();

        let turn = f
            .service
            .handle_message(Some(chat_id.clone()), "I want a refund")
            .await
            .unwrap();

        assert_eq!(turn.reply, "What is your booking reference?");
        assert_eq!(turn.workflow.as_deref(), Some("Refund"));
        assert_eq!(f.llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_active_workflow_is_resumed_without_intent_matching() {
        let mut intent = MockIntentMatcher::new();
        intent
            .expect_match_intent()
            .times(1)
            .returning(|_, _| Some("Refund".to_string()));
        let f = fixture(intent, MockLlmProvider::new("openai").with_reply("unused"));
        let chat_id = ChatId::new("c1").unwrap();

        f.service
            .handle_message(Some(chat_id.clone()), "refund please")
            .await
            .unwrap();
        let turn = f
            .service
            .handle_message(Some(chat_id.clone()), "ABC123")
            .await
            .unwrap();

        assert_eq!(turn.status, Some(TurnStatus::Completed));
        assert_eq!(turn.reply, "Refund process completed!");
        assert!(f.service.state(&chat_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_general_chat_uses_system_prompt_and_history() {
        let f = fixture(
            intent_returning(None),
            MockLlmProvider::new("openai")
                .with_reply("We fly to Lisbon.")
                .with_reply("Daily at 9am."),
        );
        let chat_id = ChatId::new("c1").unwrap();

        f.service
            .handle_message(Some(chat_id.clone()), "Do you fly to Lisbon?")
            .await
            .unwrap();
        f.service
            .handle_message(Some(chat_id.clone()), "How often?")
            .await
            .unwrap();

        let requests = f.llm.requests();
        let last = &requests[1];
        assert_eq!(
            last.messages[0].content_text(),
            ConversationServiceConfig::default().system_prompt
        );
        assert_eq!(last.messages.len(), 4);
        assert_eq!(last.messages[3].content_text(), "How often?");
    }

    #[tokio::test]
    async fn test_general_chat_failure_apologises() {
        let f = fixture(
            intent_returning(None),
            MockLlmProvider::new("openai").with_error("upstream 500"),
        );

        let turn = f.service.handle_message(None, "hello").await.unwrap();

        assert_eq!(turn.reply, CHAT_APOLOGY);
    }

    #[tokio::test]
    async fn test_run_unknown_workflow_is_not_found() {
        let f = fixture(intent_returning(None), MockLlmProvider::new("openai"));

        let err = f
            .service
            .run_workflow("Baggage", ChatId::new("c1").unwrap(), "hi")
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_run_workflow_directly() {
        let f = fixture(intent_returning(None), MockLlmProvider::new("openai"));
        let chat_id = ChatId::new("c1").unwrap();

        let turn = f
            .service
            .run_workflow("refund", chat_id.clone(), "hi")
            .await
            .unwrap();

        assert_eq!(
            turn.status,
            Some(TurnStatus::AwaitingInput {
                step_id: "ask_ref".to_string()
            })
        );
        let history = f.service.history(&chat_id, false).await.unwrap();
        assert_eq!(history[0].role, ChatRole::User);
        assert_eq!(history[1].text, "What is your booking reference?");
    }

    #[tokio::test]
    async fn test_workflow_missing_from_catalog_is_cleared() {
        let f = fixture(intent_returning(None), MockLlmProvider::new("openai"));
        let chat_id = ChatId::new("c1").unwrap();

        let retired = WorkflowDefinition::new(
            "Retired",
            "",
            vec![StepDefinition::action("a").requiring_response("?", "text")],
        )
        .unwrap();
        f.store
            .set_state(&chat_id, &ConversationWorkflowState::start(&retired))
            .await
            .unwrap();

        let turn = f
            .service
            .handle_message(Some(chat_id.clone()), "hello?")
            .await
            .unwrap();

        assert_eq!(turn.reply, MISSING_WORKFLOW_APOLOGY);
        assert!(f.service.state(&chat_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_and_history_filtering() {
        let f = fixture(intent_returning(Some("Refund")), MockLlmProvider::new("openai"));
        let chat_id = ChatId::new("c1").unwrap();

        f.service
            .handle_message(Some(chat_id.clone()), "refund")
            .await
            .unwrap();

        let all = f.service.history(&chat_id, true).await.unwrap();
        let visible = f.service.history(&chat_id, false).await.unwrap();
        assert!(all.len() > visible.len());
        assert!(visible.iter().all(|m| !m.is_debug()));

        assert!(f.service.reset(&chat_id).await.unwrap());
        assert!(!f.service.reset(&chat_id).await.unwrap());
    }
}
