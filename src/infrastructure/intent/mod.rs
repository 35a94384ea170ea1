//! Intent matchers

mod llm_intent_matcher;

pub use llm_intent_matcher::LlmIntentMatcher;
