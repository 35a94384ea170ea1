//! AOP execution engine
//!
//! Drives one workflow instance per conversation, one turn at a time. A turn either
//! pauses at an input step, asks again after a rejected answer, or runs the workflow
//! to its end. All progress is written to the [`ConversationStore`] before the engine
//! moves on, so a crash loses at most the turn in flight.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::domain::aop::{
    ActionOutcome, ActionRegistry, ConversationWorkflowState, InputValidator, StepDefinition,
    StepKind, TurnOutcome, TurnStatus, ValidationPrompt, ValidationVerdict, VerdictStatus,
    WorkflowData, WorkflowDefinition,
};
use crate::domain::conversation::{ChatId, ChatRole, ConversationStore, MessageType};
use crate::domain::DomainError;
use crate::infrastructure::observability::record_turn;

const APOLOGY: &str = "Sorry, something went wrong while handling your request. Please try again.";

/// Limits applied by the engine
#[derive(Debug, Clone)]
pub struct AopEngineConfig {
    /// Invalid answers tolerated per input step
    pub max_retries: u32,

    /// Upper bound on one validator call
    pub validation_timeout: Duration,

    /// Maximum number of non-interactive steps per turn (prevents infinite loops)
    pub max_auto_steps: usize,
}

impl Default for AopEngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            validation_timeout: Duration::from_secs(30),
            max_auto_steps: 100,
        }
    }
}

impl From<&EngineConfig> for AopEngineConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            validation_timeout: Duration::from_millis(config.validation_timeout_ms),
            max_auto_steps: config.max_auto_steps,
        }
    }
}

/// Routing chosen by a decision step
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Next step id; `None` ends the workflow
    pub next: Option<String>,
    /// Audit text for the conversation log
    pub narration: String,
}

/// Evaluate a step's rules in order against `data`
///
/// The first rule that holds wins. Without a match the first rule's target is used;
/// a step without rules ends the workflow. Rules that fail to evaluate count as not
/// matched and are mentioned in the narration.
pub fn decide(step: &StepDefinition, data: &WorkflowData) -> Decision {
    let rules = step.decision_rules();
    let mut skipped = Vec::new();

    for rule in rules {
        match rule.condition.evaluate(data) {
            Ok(true) => {
                return Decision {
                    next: Some(rule.next_step_id.clone()),
                    narration: with_skipped(
                        format!(
                            "Condition matched: {} → {}",
                            rule.condition.as_str(),
                            rule.next_step_id
                        ),
                        &skipped,
                    ),
                };
            }
            Ok(false) => {}
            Err(e) => skipped.push(format!("'{}' ({})", rule.condition.as_str(), e)),
        }
    }

    let narration = match rules.first() {
        Some(first) => format!(
            "No matching condition at {}, falling back to {}",
            step.id(),
            first.next_step_id
        ),
        None => format!("No decision rules at {}, finishing", step.id()),
    };

    Decision {
        next: rules.first().map(|r| r.next_step_id.clone()),
        narration: with_skipped(narration, &skipped),
    }
}

fn with_skipped(narration: String, skipped: &[String]) -> String {
    if skipped.is_empty() {
        narration
    } else {
        format!("{}; skipped unevaluable {}", narration, skipped.join(", "))
    }
}

/// Result of handling the answer to an input step
enum AnswerHandled {
    /// Answer accepted, continue at the given step (or finish on `None`)
    Advance(Option<String>),
    /// Turn is over
    Done(TurnOutcome),
}

/// The AOP execution engine
#[derive(Debug, Clone)]
pub struct AopEngine {
    store: Arc<dyn ConversationStore>,
    validator: Arc<dyn InputValidator>,
    actions: Arc<ActionRegistry>,
    config: AopEngineConfig,
}

impl AopEngine {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        validator: Arc<dyn InputValidator>,
        actions: Arc<ActionRegistry>,
    ) -> Self {
        Self::with_config(store, validator, actions, AopEngineConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn ConversationStore>,
        validator: Arc<dyn InputValidator>,
        actions: Arc<ActionRegistry>,
        config: AopEngineConfig,
    ) -> Self {
        Self {
            store,
            validator,
            actions,
            config,
        }
    }

    pub fn config(&self) -> &AopEngineConfig {
        &self.config
    }

    /// Advance `workflow` by one turn for `chat_id`
    ///
    /// Only store failures are returned as errors; every workflow-level fault ends in a
    /// user-facing reply.
    pub async fn run(
        &self,
        workflow: &WorkflowDefinition,
        user_message: &str,
        chat_id: &ChatId,
    ) -> Result<TurnOutcome, DomainError> {
        let start = Instant::now();
        let outcome = self.run_turn(workflow, user_message, chat_id).await?;

        record_turn(workflow.name(), outcome.status.label(), start.elapsed());
        info!(
            chat_id = %chat_id,
            workflow = workflow.name(),
            status = outcome.status.label(),
            "AOP turn finished"
        );

        Ok(outcome)
    }

    async fn run_turn(
        &self,
        workflow: &WorkflowDefinition,
        user_message: &str,
        chat_id: &ChatId,
    ) -> Result<TurnOutcome, DomainError> {
        let state = match self.store.get_state(chat_id).await? {
            Some(state) if !state.belongs_to(workflow) => {
                return self.busy(chat_id, &state.workflow_name).await;
            }
            Some(state) => state,
            None => {
                let state = ConversationWorkflowState::start(workflow);
                self.store.set_state(chat_id, &state).await?;
                info!(chat_id = %chat_id, workflow = workflow.name(), "Starting AOP");
                state
            }
        };

        self.advance(workflow, state, user_message, chat_id).await
    }

    async fn advance(
        &self,
        workflow: &WorkflowDefinition,
        mut state: ConversationWorkflowState,
        user_message: &str,
        chat_id: &ChatId,
    ) -> Result<TurnOutcome, DomainError> {
        let mut auto_steps = 0usize;

        loop {
            let Some(step) = workflow.step(&state.current_step_id) else {
                let narration = format!(
                    "Step '{}' not found in {}, stopping",
                    state.current_step_id,
                    workflow.name()
                );
                return self.abort(chat_id, workflow, narration).await;
            };

            let next = if step.requires_response() {
                if !state.awaiting_input {
                    return self.ask(chat_id, &mut state, step).await;
                }

                match self
                    .handle_answer(workflow, step, &mut state, user_message, chat_id)
                    .await?
                {
                    AnswerHandled::Advance(next) => next,
                    AnswerHandled::Done(outcome) => return Ok(outcome),
                }
            } else {
                auto_steps += 1;
                if auto_steps > self.config.max_auto_steps {
                    let narration = format!(
                        "Stopped after {} automatic steps at {}",
                        self.config.max_auto_steps,
                        step.id()
                    );
                    return self.abort(chat_id, workflow, narration).await;
                }

                self.execute_step(step, &mut state, chat_id).await?
            };

            match next {
                Some(next_step_id) => {
                    debug!(
                        chat_id = %chat_id,
                        from = step.id(),
                        to = %next_step_id,
                        "Advancing"
                    );
                    state.move_to(next_step_id);
                    self.store.set_state(chat_id, &state).await?;
                }
                None => return self.complete(chat_id, workflow, step).await,
            }
        }
    }

    /// Branch A: persist the pause and ask the step's question
    async fn ask(
        &self,
        chat_id: &ChatId,
        state: &mut ConversationWorkflowState,
        step: &StepDefinition,
    ) -> Result<TurnOutcome, DomainError> {
        state.awaiting_input = true;
        state.touch();
        self.store.set_state(chat_id, state).await?;

        let prompt = match (step.user_prompt(), step.expected_input()) {
            (Some(prompt), _) => prompt.to_string(),
            (None, Some(expected)) => format!("Please provide {}.", expected),
            (None, None) => "Please provide the requested information.".to_string(),
        };
        self.reply(chat_id, &prompt).await?;

        Ok(TurnOutcome::new(
            prompt,
            TurnStatus::AwaitingInput {
                step_id: step.id().to_string(),
            },
        ))
    }

    /// Branch B: validate the answer to the step we are waiting on
    async fn handle_answer(
        &self,
        workflow: &WorkflowDefinition,
        step: &StepDefinition,
        state: &mut ConversationWorkflowState,
        answer: &str,
        chat_id: &ChatId,
    ) -> Result<AnswerHandled, DomainError> {
        let verdict = self.validate(workflow, step, answer, chat_id).await;

        match verdict.status {
            VerdictStatus::Cancel => {
                self.store.clear_state(chat_id).await?;
                self.narrate(chat_id, &format!("Cancelled at {}: {}", step.id(), verdict.reason))
                    .await?;

                let reply = format!("No problem, I've cancelled your {} request.", workflow.name());
                self.reply(chat_id, &reply).await?;

                Ok(AnswerHandled::Done(TurnOutcome::new(reply, TurnStatus::Cancelled)))
            }
            VerdictStatus::Invalid => {
                state.retry_count += 1;
                let max_retries = self.config.max_retries;

                if state.retry_count >= max_retries {
                    self.store.clear_state(chat_id).await?;
                    self.narrate(
                        chat_id,
                        &format!("Retries exhausted at {} ({} attempts)", step.id(), max_retries),
                    )
                    .await?;

                    let reply = format!(
                        "Too many invalid attempts, so I've cancelled your {} request. \
                         Feel free to start again.",
                        workflow.name()
                    );
                    self.reply(chat_id, &reply).await?;

                    return Ok(AnswerHandled::Done(TurnOutcome::new(
                        reply,
                        TurnStatus::RetriesExhausted,
                    )));
                }

                state.touch();
                self.store.set_state(chat_id, state).await?;

                let reply = format!(
                    "{}. Please try again. ({}/{})",
                    verdict.reason.trim().trim_end_matches('.'),
                    state.retry_count,
                    max_retries
                );
                self.reply(chat_id, &reply).await?;

                Ok(AnswerHandled::Done(TurnOutcome::new(
                    reply,
                    TurnStatus::RetryRequested {
                        attempt: state.retry_count,
                        max_retries,
                    },
                )))
            }
            VerdictStatus::Valid => {
                state.data.insert(step.id(), answer.trim());
                state.retry_count = 0;

                let mut narration = format!("Step {}: answer accepted", step.id());
                if let Some(action) = step.action_name() {
                    let (data, note) = self.apply_action(action, state.data.clone()).await;
                    state.data = data;
                    narration = format!("{}; {}", narration, note);
                }

                let next = if step.kind() == StepKind::Decision {
                    let decision = decide(step, &state.data);
                    narration = format!("{}; {}", narration, decision.narration);
                    decision.next
                } else {
                    step.success_next().map(str::to_string)
                };

                self.narrate(chat_id, &narration).await?;

                Ok(AnswerHandled::Advance(next))
            }
        }
    }

    /// Ask the validator, mapping failures and timeouts to an invalid verdict
    async fn validate(
        &self,
        workflow: &WorkflowDefinition,
        step: &StepDefinition,
        answer: &str,
        chat_id: &ChatId,
    ) -> ValidationVerdict {
        let prompt = ValidationPrompt::for_step(workflow, step, answer).render();

        match tokio::time::timeout(self.config.validation_timeout, self.validator.validate(&prompt))
            .await
        {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(e)) => {
                warn!(chat_id = %chat_id, step = step.id(), error = %e, "Validator failed");
                ValidationVerdict::invalid("validation error")
            }
            Err(_) => {
                warn!(
                    chat_id = %chat_id,
                    step = step.id(),
                    timeout_ms = self.config.validation_timeout.as_millis() as u64,
                    "Validator timed out"
                );
                ValidationVerdict::invalid("validation timed out")
            }
        }
    }

    /// Branch C: run one non-interactive step and pick the next one
    async fn execute_step(
        &self,
        step: &StepDefinition,
        state: &mut ConversationWorkflowState,
        chat_id: &ChatId,
    ) -> Result<Option<String>, DomainError> {
        let header = format!("Step {} ({})", step.id(), step.kind());

        let (next, note) = match step.kind() {
            StepKind::Decision => {
                let decision = decide(step, &state.data);
                (decision.next, Some(decision.narration))
            }
            StepKind::Action => match step.action_name() {
                Some(action) => {
                    let (data, note) = self.apply_action(action, state.data.clone()).await;
                    state.data = data;
                    (step.success_next().map(str::to_string), Some(note))
                }
                None => (step.success_next().map(str::to_string), None),
            },
            StepKind::Terminal => (None, None),
        };

        let narration = match note {
            Some(note) => format!("{}: {}", header, note),
            None => header,
        };
        self.narrate(chat_id, &narration).await?;

        Ok(next)
    }

    async fn apply_action(&self, action: &str, data: WorkflowData) -> (WorkflowData, String) {
        let invocation = self.actions.invoke(action, data).await;

        let note = match invocation.outcome {
            ActionOutcome::Applied => format!("Executing action: {}", action),
            ActionOutcome::NotRegistered => format!("Action {} not registered, skipped", action),
            ActionOutcome::Failed(message) => {
                format!("Action {} failed, data unchanged: {}", action, message)
            }
        };

        (invocation.data, note)
    }

    /// The workflow reached its end at `last_step`
    async fn complete(
        &self,
        chat_id: &ChatId,
        workflow: &WorkflowDefinition,
        last_step: &StepDefinition,
    ) -> Result<TurnOutcome, DomainError> {
        self.store.clear_state(chat_id).await?;
        info!(chat_id = %chat_id, workflow = workflow.name(), "Finished AOP");

        let reply = match last_step.user_prompt() {
            Some(prompt) if !last_step.requires_response() => prompt.to_string(),
            _ => format!("{} process completed!", workflow.name()),
        };
        self.reply(chat_id, &reply).await?;

        Ok(TurnOutcome::new(reply, TurnStatus::Completed))
    }

    /// Definition fault: drop the instance and apologise
    async fn abort(
        &self,
        chat_id: &ChatId,
        workflow: &WorkflowDefinition,
        narration: String,
    ) -> Result<TurnOutcome, DomainError> {
        warn!(chat_id = %chat_id, workflow = workflow.name(), "{}", narration);

        self.store.clear_state(chat_id).await?;
        self.narrate(chat_id, &narration).await?;
        self.reply(chat_id, APOLOGY).await?;

        Ok(TurnOutcome::new(APOLOGY, TurnStatus::Aborted))
    }

    async fn busy(&self, chat_id: &ChatId, active: &str) -> Result<TurnOutcome, DomainError> {
        let reply = format!(
            "You already have a {} request in progress. \
             Please finish the current request or say cancel.",
            active
        );
        self.reply(chat_id, &reply).await?;

        Ok(TurnOutcome::new(
            reply,
            TurnStatus::Busy {
                active_workflow: active.to_string(),
            },
        ))
    }

    async fn reply(&self, chat_id: &ChatId, text: &str) -> Result<(), DomainError> {
        self.store
            .add_message(chat_id, ChatRole::Agent, text, MessageType::Reply)
            .await
    }

    async fn narrate(&self, chat_id: &ChatId, text: &str) -> Result<(), DomainError> {
        self.store
            .add_message(chat_id, ChatRole::Agent, text, MessageType::Debug)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use mockall::Sequence;

    use super::*;
    use crate::domain::aop::{ActionError, Condition, DecisionRule, MockInputValidator};
    use crate::domain::conversation::{ChatMessage, MockConversationStore};
    use crate::infrastructure::conversation::InMemoryConversationStore;

    fn chat() -> ChatId {
        ChatId::new("chat-42").unwrap()
    }

    fn rule(condition: &str, next: &str) -> DecisionRule {
        DecisionRule::new(Condition::parse(condition).unwrap(), next)
    }

    fn refund_workflow() -> WorkflowDefinition {
        WorkflowDefinition::new(
            "Refund",
            "Refund a booking",
            vec![
                StepDefinition::action("ask_ref")
                    .requiring_response("What is your booking reference?", "booking ref")
                    .with_next("do_refund"),
                StepDefinition::action("do_refund").with_action("initiate_refund"),
            ],
        )
        .unwrap()
    }

    fn two_question_workflow() -> WorkflowDefinition {
        WorkflowDefinition::new(
            "Flight Change",
            "Change a flight",
            vec![
                StepDefinition::action("name")
                    .requiring_response("What is your name?", "a person's name")
                    .with_next("booking_reference"),
                StepDefinition::action("booking_reference")
                    .requiring_response("What is your booking reference?", "booking ref")
                    .with_next("done"),
                StepDefinition::terminal("done").with_prompt("All set!"),
            ],
        )
        .unwrap()
    }

    fn validator_always(verdict: ValidationVerdict) -> Arc<MockInputValidator> {
        let mut validator = MockInputValidator::new();
        validator
            .expect_validate()
            .returning(move |_| Ok(verdict.clone()));
        Arc::new(validator)
    }

    fn engine_with(
        store: Arc<InMemoryConversationStore>,
        validator: Arc<dyn InputValidator>,
        actions: ActionRegistry,
    ) -> AopEngine {
        AopEngine::new(store, validator, Arc::new(actions))
    }

    async fn debug_messages(store: &InMemoryConversationStore) -> Vec<ChatMessage> {
        store
            .messages(&chat())
            .await
            .unwrap()
            .into_iter()
            .filter(ChatMessage::is_debug)
            .collect()
    }

    /// Validator that never answers in time
    #[derive(Debug)]
    struct SlowValidator;

    #[async_trait]
    impl InputValidator for SlowValidator {
        async fn validate(&self, _prompt: &str) -> Result<ValidationVerdict, DomainError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ValidationVerdict::valid("too late"))
        }
    }

    #[tokio::test]
    async fn test_refund_end_to_end() {
        let refunds = Arc::new(AtomicUsize::new(0));
        let counter = refunds.clone();
        let actions = ActionRegistry::new().with_fn("initiate_refund", move |data| {
            counter.fetch_add(1, Ordering::SeqCst);
            data.insert("refund_processed", true);
            Ok(())
        });

        let mut validator = MockInputValidator::new();
        validator
            .expect_validate()
            .withf(|prompt| prompt.contains("ABC123") && prompt.contains("booking ref"))
            .times(1)
            .returning(|_| Ok(ValidationVerdict::valid("looks like a reference")));

        let store = Arc::new(InMemoryConversationStore::new());
        let engine = engine_with(store.clone(), Arc::new(validator), actions);
        let workflow = refund_workflow();

        let first = engine.run(&workflow, "hi", &chat()).await.unwrap();
        assert_eq!(first.reply, "What is your booking reference?");
        assert_eq!(
            first.status,
            TurnStatus::AwaitingInput {
                step_id: "ask_ref".to_string()
            }
        );

        let state = store.get_state(&chat()).await.unwrap().unwrap();
        assert!(state.awaiting_input);
        assert_eq!(state.current_step_id, "ask_ref");

        let second = engine.run(&workflow, "ABC123", &chat()).await.unwrap();
        assert_eq!(second.status, TurnStatus::Completed);
        assert_eq!(second.reply, "Refund process completed!");
        assert_eq!(refunds.load(Ordering::SeqCst), 1);
        assert!(store.get_state(&chat()).await.unwrap().is_none());

        let replies: Vec<String> = store
            .messages(&chat())
            .await
            .unwrap()
            .into_iter()
            .filter(|m| !m.is_debug())
            .map(|m| m.text)
            .collect();
        assert_eq!(
            replies,
            vec!["What is your booking reference?", "Refund process completed!"]
        );
    }

    #[tokio::test]
    async fn test_resumes_at_same_step_with_data_intact() {
        let store = Arc::new(InMemoryConversationStore::new());
        let mut validator = MockInputValidator::new();
        let mut seq = Sequence::new();
        validator
            .expect_validate()
            .withf(|prompt| prompt.contains("Step: name"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ValidationVerdict::valid("ok")));
        validator
            .expect_validate()
            .withf(|prompt| prompt.contains("Step: booking_reference"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ValidationVerdict::valid("ok")));

        let engine = engine_with(store.clone(), Arc::new(validator), ActionRegistry::new());
        let workflow = two_question_workflow();

        engine.run(&workflow, "change my flight", &chat()).await.unwrap();
        let second = engine.run(&workflow, "Alice", &chat()).await.unwrap();
        assert_eq!(second.reply, "What is your booking reference?");

        let paused = store.get_state(&chat()).await.unwrap().unwrap();
        assert_eq!(paused.current_step_id, "booking_reference");
        assert!(paused.awaiting_input);
        assert_eq!(paused.data.get_str("name"), Some("Alice"));

        let third = engine.run(&workflow, "XYZ789", &chat()).await.unwrap();
        assert_eq!(third.status, TurnStatus::Completed);
        assert_eq!(third.reply, "All set!");
    }

    #[tokio::test]
    async fn test_new_workflow_starts_fresh_after_completion() {
        let store = Arc::new(InMemoryConversationStore::new());
        let engine = engine_with(
            store.clone(),
            validator_always(ValidationVerdict::valid("ok")),
            ActionRegistry::new(),
        );

        engine.run(&refund_workflow(), "hi", &chat()).await.unwrap();
        engine.run(&refund_workflow(), "ABC123", &chat()).await.unwrap();
        assert!(store.get_state(&chat()).await.unwrap().is_none());

        let outcome = engine.run(&two_question_workflow(), "hi", &chat()).await.unwrap();
        assert_eq!(outcome.reply, "What is your name?");

        let state = store.get_state(&chat()).await.unwrap().unwrap();
        assert_eq!(state.workflow_name, "Flight Change");
        assert!(state.data.is_empty());
    }

    #[tokio::test]
    async fn test_other_workflow_is_rejected_while_one_is_active() {
        let store = Arc::new(InMemoryConversationStore::new());
        let mut validator = MockInputValidator::new();
        validator.expect_validate().never();

        let engine = engine_with(store.clone(), Arc::new(validator), ActionRegistry::new());

        engine.run(&refund_workflow(), "hi", &chat()).await.unwrap();
        let before = store.get_state(&chat()).await.unwrap();

        let outcome = engine
            .run(&two_question_workflow(), "change my flight", &chat())
            .await
            .unwrap();

        assert_eq!(
            outcome.status,
            TurnStatus::Busy {
                active_workflow: "Refund".to_string()
            }
        );
        assert!(outcome.reply.contains("finish the current request or say cancel"));
        assert_eq!(store.get_state(&chat()).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_retry_ceiling_cancels_workflow() {
        let store = Arc::new(InMemoryConversationStore::new());
        let engine = engine_with(
            store.clone(),
            validator_always(ValidationVerdict::invalid("That is not a booking reference.")),
            ActionRegistry::new(),
        );
        let workflow = refund_workflow();

        engine.run(&workflow, "hi", &chat()).await.unwrap();

        let first = engine.run(&workflow, "banana", &chat()).await.unwrap();
        assert_eq!(
            first.reply,
            "That is not a booking reference. Please try again. (1/3)"
        );
        assert_eq!(
            first.status,
            TurnStatus::RetryRequested {
                attempt: 1,
                max_retries: 3
            }
        );

        let second = engine.run(&workflow, "apple", &chat()).await.unwrap();
        assert!(second.reply.ends_with("(2/3)"));
        let state = store.get_state(&chat()).await.unwrap().unwrap();
        assert_eq!(state.retry_count, 2);
        assert!(state.awaiting_input);

        let third = engine.run(&workflow, "cherry", &chat()).await.unwrap();
        assert_eq!(third.status, TurnStatus::RetriesExhausted);
        assert!(store.get_state(&chat()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_valid_answer_after_retries_advances() {
        let store = Arc::new(InMemoryConversationStore::new());
        let mut validator = MockInputValidator::new();
        let mut seq = Sequence::new();
        validator
            .expect_validate()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ValidationVerdict::invalid("not a reference")));
        validator
            .expect_validate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ValidationVerdict::valid("ok")));

        let engine = engine_with(store.clone(), Arc::new(validator), ActionRegistry::new());
        let workflow = refund_workflow();

        engine.run(&workflow, "hi", &chat()).await.unwrap();
        engine.run(&workflow, "x", &chat()).await.unwrap();
        engine.run(&workflow, "y", &chat()).await.unwrap();
        let outcome = engine.run(&workflow, "ABC123", &chat()).await.unwrap();

        assert_eq!(outcome.status, TurnStatus::Completed);
    }

    #[tokio::test]
    async fn test_retry_count_resets_on_next_step() {
        let store = Arc::new(InMemoryConversationStore::new());
        let mut validator = MockInputValidator::new();
        let mut seq = Sequence::new();
        validator
            .expect_validate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ValidationVerdict::invalid("no")));
        validator
            .expect_validate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ValidationVerdict::valid("ok")));

        let engine = engine_with(store.clone(), Arc::new(validator), ActionRegistry::new());
        let workflow = two_question_workflow();

        engine.run(&workflow, "hi", &chat()).await.unwrap();
        engine.run(&workflow, "???", &chat()).await.unwrap();
        engine.run(&workflow, "Alice", &chat()).await.unwrap();

        let state = store.get_state(&chat()).await.unwrap().unwrap();
        assert_eq!(state.current_step_id, "booking_reference");
        assert_eq!(state.retry_count, 0);
    }

    #[tokio::test]
    async fn test_cancel_verdict_clears_state() {
        let store = Arc::new(InMemoryConversationStore::new());
        let engine = engine_with(
            store.clone(),
            validator_always(ValidationVerdict::cancel("user wants to stop")),
            ActionRegistry::new(),
        );

        engine.run(&refund_workflow(), "hi", &chat()).await.unwrap();
        let outcome = engine
            .run(&refund_workflow(), "never mind, cancel", &chat())
            .await
            .unwrap();

        assert_eq!(outcome.status, TurnStatus::Cancelled);
        assert!(outcome.reply.contains("cancelled your Refund request"));
        assert!(store.get_state(&chat()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_validator_error_counts_as_invalid() {
        let store = Arc::new(InMemoryConversationStore::new());
        let mut validator = MockInputValidator::new();
        validator
            .expect_validate()
            .returning(|_| Err(DomainError::provider("openai", "rate limited")));

        let engine = engine_with(store.clone(), Arc::new(validator), ActionRegistry::new());

        engine.run(&refund_workflow(), "hi", &chat()).await.unwrap();
        let outcome = engine.run(&refund_workflow(), "ABC123", &chat()).await.unwrap();

        assert_eq!(outcome.reply, "validation error. Please try again. (1/3)");
        assert!(!outcome.reply.contains("rate limited"));
    }

    #[tokio::test]
    async fn test_validator_timeout_counts_as_invalid() {
        let store = Arc::new(InMemoryConversationStore::new());
        let config = AopEngineConfig {
            validation_timeout: Duration::from_millis(20),
            ..AopEngineConfig::default()
        };
        let engine = AopEngine::with_config(
            store.clone(),
            Arc::new(SlowValidator),
            Arc::new(ActionRegistry::new()),
            config,
        );

        engine.run(&refund_workflow(), "hi", &chat()).await.unwrap();
        let outcome = engine.run(&refund_workflow(), "ABC123", &chat()).await.unwrap();

        assert_eq!(outcome.reply, "validation timed out. Please try again. (1/3)");
        let state = store.get_state(&chat()).await.unwrap().unwrap();
        assert_eq!(state.retry_count, 1);
    }

    #[test]
    fn test_decide_first_match_wins() {
        let step = StepDefinition::decision("route")
            .with_rule(rule("x > 5", "A"))
            .with_rule(rule("x > 0", "B"));

        let high = decide(&step, &WorkflowData::new().with("x", 10));
        let low = decide(&step, &WorkflowData::new().with("x", 3));

        assert_eq!(high.next.as_deref(), Some("A"));
        assert_eq!(low.next.as_deref(), Some("B"));
        assert_eq!(high.narration, "Condition matched: x > 5 → A");
    }

    #[test]
    fn test_decide_falls_back_to_first_rule() {
        let step = StepDefinition::decision("route")
            .with_rule(rule("x > 5", "A"))
            .with_rule(rule("x > 0", "B"));

        let decision = decide(&step, &WorkflowData::new().with("x", -1));

        assert_eq!(decision.next.as_deref(), Some("A"));
        assert!(decision.narration.starts_with("No matching condition at route"));
    }

    #[test]
    fn test_decide_without_rules_finishes() {
        let decision = decide(&StepDefinition::decision("route"), &WorkflowData::new());
        assert_eq!(decision.next, None);
    }

    #[test]
    fn test_decide_skips_unevaluable_rules() {
        let step = StepDefinition::decision("route")
            .with_rule(rule("missing > 1", "A"))
            .with_rule(rule("x > 0", "B"));

        let decision = decide(&step, &WorkflowData::new().with("x", 1));

        assert_eq!(decision.next.as_deref(), Some("B"));
        assert!(decision.narration.contains("skipped unevaluable 'missing > 1'"));
    }

    #[tokio::test]
    async fn test_decision_routing_through_engine() {
        let workflow = WorkflowDefinition::new(
            "Routing",
            "",
            vec![
                StepDefinition::action("x")
                    .requiring_response("Pick a number", "a number")
                    .with_next("route"),
                StepDefinition::decision("route")
                    .with_rule(rule("x > 5", "A"))
                    .with_rule(rule("x > 0", "B")),
                StepDefinition::terminal("A").with_prompt("Big"),
                StepDefinition::terminal("B").with_prompt("Small"),
            ],
        )
        .unwrap();

        for (answer, expected) in [("10", "Big"), ("3", "Small")] {
            let store = Arc::new(InMemoryConversationStore::new());
            let engine = engine_with(
                store,
                validator_always(ValidationVerdict::valid("ok")),
                ActionRegistry::new(),
            );

            engine.run(&workflow, "start", &chat()).await.unwrap();
            let outcome = engine.run(&workflow, answer, &chat()).await.unwrap();

            assert_eq!(outcome.reply, expected);
        }
    }

    #[tokio::test]
    async fn test_auto_advance_chains_actions_in_one_turn() {
        let workflow = WorkflowDefinition::new(
            "Chain",
            "",
            vec![
                StepDefinition::action("a1").with_action("one").with_next("a2"),
                StepDefinition::action("a2").with_action("two").with_next("a3"),
                StepDefinition::action("a3").with_action("three"),
            ],
        )
        .unwrap();
        let actions = ActionRegistry::new()
            .with_fn("one", |d| {
                d.insert("one", true);
                Ok(())
            })
            .with_fn("two", |d| {
                d.insert("two", true);
                Ok(())
            })
            .with_fn("three", |d| {
                d.insert("three", true);
                Ok(())
            });

        let store = Arc::new(InMemoryConversationStore::new());
        let mut validator = MockInputValidator::new();
        validator.expect_validate().never();
        let engine = engine_with(store.clone(), Arc::new(validator), actions);

        let outcome = engine.run(&workflow, "go", &chat()).await.unwrap();

        assert_eq!(outcome.status, TurnStatus::Completed);
        assert_eq!(outcome.reply, "Chain process completed!");

        let debug = debug_messages(&store).await;
        assert_eq!(debug.len(), 3);
        assert_eq!(debug[0].text, "Step a1 (action): Executing action: one");
        assert_eq!(debug[2].text, "Step a3 (action): Executing action: three");

        let replies = store.messages(&chat()).await.unwrap().len() - debug.len();
        assert_eq!(replies, 1);
    }

    #[tokio::test]
    async fn test_auto_advance_stops_at_input_step() {
        let workflow = WorkflowDefinition::new(
            "Lookup",
            "",
            vec![
                StepDefinition::action("fetch").with_action("fetch").with_next("confirm"),
                StepDefinition::action("confirm")
                    .requiring_response("Shall I proceed?", "yes or no"),
            ],
        )
        .unwrap();
        let actions = ActionRegistry::new().with_fn("fetch", |d| {
            d.insert("fetched", true);
            Ok(())
        });

        let store = Arc::new(InMemoryConversationStore::new());
        let engine = engine_with(
            store.clone(),
            validator_always(ValidationVerdict::valid("ok")),
            actions,
        );

        let outcome = engine.run(&workflow, "go", &chat()).await.unwrap();

        assert_eq!(outcome.reply, "Shall I proceed?");
        let state = store.get_state(&chat()).await.unwrap().unwrap();
        assert_eq!(state.current_step_id, "confirm");
        assert_eq!(state.data.get_bool("fetched"), Some(true));
    }

    #[tokio::test]
    async fn test_unregistered_action_is_skipped() {
        let workflow = WorkflowDefinition::new(
            "Lookup",
            "",
            vec![
                StepDefinition::action("fetch")
                    .with_action("not_implemented_yet")
                    .with_next("pause"),
                StepDefinition::action("pause").requiring_response("Anything else?", "text"),
            ],
        )
        .unwrap();

        let store = Arc::new(InMemoryConversationStore::new());
        let engine = engine_with(
            store.clone(),
            validator_always(ValidationVerdict::valid("ok")),
            ActionRegistry::new(),
        );

        let outcome = engine.run(&workflow, "go", &chat()).await.unwrap();

        assert_eq!(outcome.reply, "Anything else?");
        let state = store.get_state(&chat()).await.unwrap().unwrap();
        assert!(state.data.is_empty());

        let debug = debug_messages(&store).await;
        assert!(debug[0].text.contains("not_implemented_yet not registered"));
    }

    #[tokio::test]
    async fn test_failing_action_still_advances() {
        let workflow = WorkflowDefinition::new(
            "Notify",
            "",
            vec![
                StepDefinition::action("notify").with_action("send").with_next("done"),
                StepDefinition::terminal("done").with_prompt("Done."),
            ],
        )
        .unwrap();
        let actions =
            ActionRegistry::new().with_fn("send", |_| Err(ActionError::new("smtp down")));

        let store = Arc::new(InMemoryConversationStore::new());
        let engine = engine_with(
            store.clone(),
            validator_always(ValidationVerdict::valid("ok")),
            actions,
        );

        let outcome = engine.run(&workflow, "go", &chat()).await.unwrap();

        assert_eq!(outcome.reply, "Done.");
        assert!(!outcome.reply.contains("smtp"));
    }

    #[tokio::test]
    async fn test_unknown_step_aborts_with_apology() {
        let store = Arc::new(InMemoryConversationStore::new());
        let workflow = refund_workflow();

        let mut state = ConversationWorkflowState::start(&workflow);
        state.current_step_id = "ghost".to_string();
        store.set_state(&chat(), &state).await.unwrap();

        let engine = engine_with(
            store.clone(),
            validator_always(ValidationVerdict::valid("ok")),
            ActionRegistry::new(),
        );

        let outcome = engine.run(&workflow, "hello?", &chat()).await.unwrap();

        assert_eq!(outcome.status, TurnStatus::Aborted);
        assert_eq!(outcome.reply, APOLOGY);
        assert!(store.get_state(&chat()).await.unwrap().is_none());
        assert!(debug_messages(&store).await[0].text.contains("'ghost' not found"));
    }

    #[tokio::test]
    async fn test_cycle_is_stopped() {
        let workflow = WorkflowDefinition::new(
            "Loop",
            "",
            vec![
                StepDefinition::action("ping").with_next("pong"),
                StepDefinition::action("pong").with_next("ping"),
            ],
        )
        .unwrap();

        let store = Arc::new(InMemoryConversationStore::new());
        let config = AopEngineConfig {
            max_auto_steps: 5,
            ..AopEngineConfig::default()
        };
        let engine = AopEngine::with_config(
            store.clone(),
            validator_always(ValidationVerdict::valid("ok")),
            Arc::new(ActionRegistry::new()),
            config,
        );

        let outcome = engine.run(&workflow, "go", &chat()).await.unwrap();

        assert_eq!(outcome.status, TurnStatus::Aborted);
        assert!(store.get_state(&chat()).await.unwrap().is_none());
        // five steps plus the fault narration
        assert_eq!(debug_messages(&store).await.len(), 6);
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let mut store = MockConversationStore::new();
        store
            .expect_get_state()
            .returning(|_| Err(DomainError::storage("connection refused")));

        let engine = AopEngine::new(
            Arc::new(store),
            validator_always(ValidationVerdict::valid("ok")),
            Arc::new(ActionRegistry::new()),
        );

        let err = engine.run(&refund_workflow(), "hi", &chat()).await.unwrap_err();
        assert!(matches!(err, DomainError::Storage { .. }));
    }

    #[test]
    fn test_config_from_engine_config() {
        let config = AopEngineConfig::from(&EngineConfig {
            max_retries: 5,
            validation_timeout_ms: 1500,
            max_auto_steps: 10,
        });

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.validation_timeout, Duration::from_millis(1500));
        assert_eq!(config.max_auto_steps, 10);
    }
}
