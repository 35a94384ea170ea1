//! AOP Agent
//!
//! Customer-support chat backend that drives conversations through
//! Agent Operating Procedures: declarative step graphs with LLM-validated
//! user input, named back-end actions and rule-based branching.

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use api::state::AppState;
use infrastructure::{
    actions::builtin_registry,
    aop::{AopEngine, AopEngineConfig},
    catalog::load_catalog,
    conversation::create_conversation_store,
    intent::LlmIntentMatcher,
    llm::LlmProviderFactory,
    services::{ConversationService, ConversationServiceConfig},
    validation::LlmValidator,
};
use tracing::info;

/// Create the application state with all services initialized
pub async fn create_app_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let llm = LlmProviderFactory::from_config(&config.llm)?;
    let store = create_conversation_store(&config.store).await?;
    let catalog = Arc::new(load_catalog(&config.catalog.path)?);

    info!(
        path = %config.catalog.path,
        workflows = catalog.len(),
        provider = llm.provider_name(),
        model = %config.llm.model,
        "Workflow catalog loaded"
    );

    let validator = Arc::new(LlmValidator::new(llm.clone(), config.llm.model.clone()));
    let intent = Arc::new(LlmIntentMatcher::new(llm.clone(), config.llm.model.clone()));

    let engine = AopEngine::with_config(
        store.clone(),
        validator,
        Arc::new(builtin_registry()),
        AopEngineConfig::from(&config.engine),
    );

    let service = ConversationService::new(
        store.clone(),
        catalog.clone(),
        engine,
        intent,
        llm,
        ConversationServiceConfig {
            model: config.llm.model.clone(),
            system_prompt: config.chat.system_prompt.clone(),
            lock_idle: Duration::from_secs(config.chat.lock_idle_secs),
        },
    );

    Ok(AppState::new(Arc::new(service), catalog, store))
}
