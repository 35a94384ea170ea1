use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::aop::{intent_prompt, resolve_answer, IntentMatcher, WorkflowCatalog};
use crate::domain::{LlmProvider, LlmRequest};
use crate::infrastructure::observability::{record_llm_request, LlmRequestMetricParams};

/// Intent matcher that asks a chat model to pick a workflow name
#[derive(Debug)]
pub struct LlmIntentMatcher {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl LlmIntentMatcher {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl IntentMatcher for LlmIntentMatcher {
    async fn match_intent(&self, message: &str, catalog: &WorkflowCatalog) -> Option<String> {
        if catalog.is_empty() {
            return None;
        }

        let request = LlmRequest::builder()
            .user(intent_prompt(message, catalog))
            .temperature(0.0)
            .build();

        let start = Instant::now();
        let result = self.provider.chat(&self.model, request).await;

        record_llm_request(LlmRequestMetricParams {
            provider: self.provider.provider_name(),
            model: &self.model,
            purpose: "intent",
            duration: start.elapsed(),
            success: result.is_ok(),
        });

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Intent matching failed, treating as no match");
                return None;
            }
        };

        let matched = resolve_answer(response.content(), catalog).map(|w| w.name().to_string());
        debug!(answer = response.content(), matched = ?matched, "Intent matched");

        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::MockLlmProvider;
    use crate::infrastructure::catalog::default_catalog;

    fn matcher(provider: MockLlmProvider) -> (Arc<MockLlmProvider>, LlmIntentMatcher) {
        let provider = Arc::new(provider);
        (provider.clone(), LlmIntentMatcher::new(provider, "gpt-4o-mini"))
    }

    #[tokio::test]
    async fn test_exact_name_matches_case_insensitively() {
        let (provider, matcher) = matcher(MockLlmProvider::new("openai").with_reply("refund"));
        let catalog = default_catalog().unwrap();

        let matched = matcher.match_intent("I want my money back", &catalog).await;

        assert_eq!(matched.as_deref(), Some("Refund"));
        let prompt = provider.requests()[0].user_text();
        assert!(prompt.contains("I want my money back"));
        assert!(prompt.contains("Flight Change"));
    }

    #[tokio::test]
    async fn test_none_answer() {
        let (_, matcher) = matcher(MockLlmProvider::new("openai").with_reply("none"));
        let catalog = default_catalog().unwrap();

        assert_eq!(matcher.match_intent("What's the weather?", &catalog).await, None);
    }

    #[tokio::test]
    async fn test_fuzzy_answer_is_not_a_match() {
        let (_, matcher) =
            matcher(MockLlmProvider::new("openai").with_reply("The Refund workflow"));
        let catalog = default_catalog().unwrap();

        assert_eq!(matcher.match_intent("money back", &catalog).await, None);
    }

    #[tokio::test]
    async fn test_provider_failure_is_no_match() {
        let (_, matcher) = matcher(MockLlmProvider::new("openai").with_error("timeout"));
        let catalog = default_catalog().unwrap();

        assert_eq!(matcher.match_intent("refund please", &catalog).await, None);
    }

    #[tokio::test]
    async fn test_empty_catalog_skips_llm() {
        let (provider, matcher) = matcher(MockLlmProvider::new("openai").with_reply("Refund"));

        let matched = matcher
            .match_intent("refund please", &WorkflowCatalog::default())
            .await;

        assert_eq!(matched, None);
        assert_eq!(provider.call_count(), 0);
    }
}
